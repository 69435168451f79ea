#[cfg(feature = "ssr")]
use chrono::NaiveDateTime;
#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};

use crate::puzzle::ArrowWord;

#[cfg(feature = "ssr")]
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::rooms)]
#[diesel(check_for_backend(Sqlite))]
pub struct Room {
    pub id: String,
    pub puzzle: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[cfg(feature = "ssr")]
impl Room {
    /// Decodes the embedded puzzle document.
    pub fn puzzle(&self) -> Result<ArrowWord, serde_json::Error> {
        serde_json::from_str(&self.puzzle)
    }
}

#[cfg(feature = "ssr")]
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::rooms)]
pub struct NewRoom<'a> {
    pub id: &'a str,
    pub puzzle: &'a str,
    // created_at and updated_at use defaults
}

#[cfg(feature = "ssr")]
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::cells)]
#[diesel(check_for_backend(Sqlite))]
pub struct Cell {
    pub id: String,
    pub room_id: String,
    pub row: i32,
    pub col: i32,
    pub value: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[cfg(feature = "ssr")]
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::cells)]
pub struct NewCell<'a> {
    pub id: &'a str,
    pub room_id: &'a str,
    pub row: i32,
    pub col: i32,
    pub value: &'a str,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A filled coordinate of a room, as sent to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ssr", derive(Queryable))]
pub struct FilledCell {
    pub row: i32,
    pub col: i32,
    pub value: String,
}

/// Everything a client needs to draw a room: the puzzle and what has been written so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomView {
    pub id: String,
    pub puzzle: ArrowWord,
    pub cells: Vec<FilledCell>,
}

/// Link to a room plus its QR code, rendered as an SVG document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareLink {
    pub url: String,
    pub qr_svg: String,
}
