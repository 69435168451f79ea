pub mod app;
#[cfg(feature = "ssr")]
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod notifier;
pub mod puzzle;
#[cfg(feature = "ssr")]
pub mod schema;
pub mod sync;

#[cfg(feature = "ssr")]
use chrono::Utc;
#[cfg(feature = "ssr")]
use diesel::connection::SimpleConnection;
#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
#[cfg(feature = "ssr")]
use diesel::upsert::excluded;
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
#[cfg(feature = "ssr")]
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
#[cfg(feature = "ssr")]
use uuid::Uuid;

#[cfg(feature = "ssr")]
use crate::error::SyncError;
#[cfg(feature = "ssr")]
use crate::model::{FilledCell, NewCell, NewRoom, Room, RoomView};
#[cfg(feature = "ssr")]
use crate::notifier::{CellChange, ChangeNotifier};
#[cfg(feature = "ssr")]
use crate::puzzle::{normalize_value, ArrowWord, Catalog};
#[cfg(feature = "ssr")]
use crate::schema::{cells, rooms};

#[cfg(feature = "hydrate")]
#[wasm_bindgen::prelude::wasm_bindgen]
pub fn hydrate() {
    use crate::app::*;
    console_error_panic_hook::set_once();
    leptos::mount::hydrate_body(App);
}

#[cfg(feature = "ssr")]
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

// WAL allows concurrent reads during writes, and the timeout retries locked operations instead of
// failing them straight away.
#[cfg(feature = "ssr")]
const SQLITE_PRAGMAS: &str = "PRAGMA foreign_keys = ON; \
    PRAGMA journal_mode = WAL; \
    PRAGMA synchronous = NORMAL; \
    PRAGMA busy_timeout = 10000;";

#[cfg(feature = "ssr")]
pub fn establish_connection(database_url: &str) -> Result<SqliteConnection, SyncError> {
    let mut conn = SqliteConnection::establish(database_url)?;
    conn.batch_execute(SQLITE_PRAGMAS)?;
    Ok(conn)
}

/// Applies the connection PRAGMAs to every connection handed out by the pool.
#[cfg(feature = "ssr")]
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas;

#[cfg(feature = "ssr")]
impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(SQLITE_PRAGMAS)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

#[cfg(feature = "ssr")]
pub fn establish_pool(
    database_url: &str,
) -> Result<Pool<ConnectionManager<SqliteConnection>>, SyncError> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Ok(Pool::builder()
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)?)
}

/// Runs every migration not yet applied. Returns how many were applied.
#[cfg(feature = "ssr")]
pub fn run_migrations(conn: &mut SqliteConnection) -> Result<usize, SyncError> {
    conn.run_pending_migrations(MIGRATIONS)
        .map(|applied| applied.len())
        .map_err(|e| SyncError::Migration(e.to_string()))
}

/// Creates a room embedding the given puzzle. Rooms are never updated afterwards.
#[cfg(feature = "ssr")]
pub fn create_room(conn: &mut SqliteConnection, puzzle: &ArrowWord) -> Result<Room, SyncError> {
    let document = serde_json::to_string(puzzle)?;
    let id = Uuid::new_v4().to_string();
    let room = diesel::insert_into(rooms::table)
        .values(&NewRoom {
            id: &id,
            puzzle: &document,
        })
        .returning(Room::as_returning())
        .get_result(conn)?;
    Ok(room)
}

/// Resolves `selector` against the catalog and creates a room for it. An unknown selector is
/// rejected before anything is written.
#[cfg(feature = "ssr")]
pub fn create_room_from_catalog(
    conn: &mut SqliteConnection,
    catalog: &Catalog,
    selector: &str,
) -> Result<Room, SyncError> {
    let puzzle = catalog.resolve(selector)?;
    create_room(conn, puzzle)
}

#[cfg(feature = "ssr")]
pub fn get_room(conn: &mut SqliteConnection, room_id: &str) -> Result<Room, SyncError> {
    rooms::table
        .filter(rooms::id.eq(room_id))
        .select(Room::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| SyncError::RoomNotFound(room_id.to_string()))
}

#[cfg(feature = "ssr")]
pub fn room_exists(conn: &mut SqliteConnection, room_id: &str) -> Result<bool, SyncError> {
    let count: i64 = rooms::table
        .filter(rooms::id.eq(room_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Writes `value` at (row, col) of a room in a single INSERT .. ON CONFLICT DO UPDATE statement
/// keyed on (room_id, row, col). Returns the id of the cell, whether it was created or updated.
///
/// The room must exist and the coordinates must be valid; this only talks to storage.
#[cfg(feature = "ssr")]
pub fn upsert_cell(
    conn: &mut SqliteConnection,
    room_id: &str,
    row: i32,
    col: i32,
    value: &str,
) -> Result<String, SyncError> {
    let now = Utc::now().naive_utc();
    let id = Uuid::new_v4().to_string();
    let new_cell = NewCell {
        id: &id,
        room_id,
        row,
        col,
        value,
        created_at: now,
        updated_at: now,
    };
    let cell_id = diesel::insert_into(cells::table)
        .values(&new_cell)
        .on_conflict((cells::room_id, cells::row, cells::col))
        .do_update()
        .set((
            cells::value.eq(excluded(cells::value)),
            cells::updated_at.eq(excluded(cells::updated_at)),
        ))
        .returning(cells::id)
        .get_result(conn)?;
    Ok(cell_id)
}

/// All cells written so far in a room, in no particular order.
#[cfg(feature = "ssr")]
pub fn list_cells(conn: &mut SqliteConnection, room_id: &str) -> Result<Vec<FilledCell>, SyncError> {
    let filled = cells::table
        .filter(cells::room_id.eq(room_id))
        .select((cells::row, cells::col, cells::value))
        .load::<FilledCell>(conn)?;
    Ok(filled)
}

/// The puzzle of a room plus its filled cells. Cleared cells are left out.
#[cfg(feature = "ssr")]
pub fn get_room_view(conn: &mut SqliteConnection, room_id: &str) -> Result<RoomView, SyncError> {
    let room = get_room(conn, room_id)?;
    let puzzle = room.puzzle()?;
    let cells = list_cells(conn, room_id)?
        .into_iter()
        .filter(|cell| !cell.value.is_empty())
        .collect();
    Ok(RoomView {
        id: room.id,
        puzzle,
        cells,
    })
}

/// Handles a player's write: validates the value and coordinates against the room's puzzle,
/// upserts the cell, then announces the change. Nothing is published unless the write was
/// stored.
#[cfg(feature = "ssr")]
pub fn submit_cell(
    conn: &mut SqliteConnection,
    notifier: &ChangeNotifier,
    room_id: &str,
    row: i32,
    col: i32,
    raw_value: &str,
) -> Result<CellChange, SyncError> {
    let value = normalize_value(raw_value)?;
    let room = get_room(conn, room_id)?;
    room.puzzle()?.description.check_writable(row, col)?;

    let cell_id = upsert_cell(conn, room_id, row, col, &value)?;

    let change = CellChange {
        room_id: room_id.to_string(),
        cell_id,
        row,
        col,
        value,
    };
    notifier.publish(&change);
    Ok(change)
}
