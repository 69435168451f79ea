use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::SyncError;

/// The built-in puzzles, shipped with the binary.
const BUILTIN_CATALOG: &str = include_str!("../data/arrowwords.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrowWord {
    pub id: u32,
    pub version: u32,
    pub difficulty: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub info: String,
    pub description: Description,
    pub solution: Solution,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Description {
    pub rows: i32,
    pub cols: i32,
    pub question_fields: Vec<QuestionField>,
    pub prize_fields: Vec<PrizeField>,
    pub prize_word: PrizeWord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrizeField {
    pub row: i32,
    pub col: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrizeWord {
    pub position: String,
    pub row: i32,
    pub col: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionField {
    pub row: i32,
    pub col: i32,
    pub arrow_type: ArrowType,
    pub question: String,
    pub word_length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArrowType {
    RightDown,
    Right,
    UpRight,
    Down,
    LeftDown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub puzzle_language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub rows: i32,
    pub cols: i32,
    pub answers: Vec<Answer>,
    pub prize_word: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub row: i32,
    pub col: i32,
    pub direction: Direction,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Vertical,
    Horizontal,
}

/// What the puzzle picker needs to know about a puzzle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzleSummary {
    pub id: u32,
    pub info: String,
    pub difficulty: String,
}

impl ArrowType {
    /// CSS class drawing the arrow next to the question field.
    pub fn css_class(self) -> &'static str {
        match self {
            ArrowType::RightDown => "arrow-right-down",
            ArrowType::Right => "arrow-right",
            ArrowType::UpRight => "arrow-up-right",
            ArrowType::Down => "arrow-down",
            ArrowType::LeftDown => "arrow-left-down",
        }
    }
}

impl QuestionField {
    /// Question text as displayed: `+` marks a line break.
    pub fn display_text(&self) -> String {
        self.question.replace('+', "\n")
    }
}

impl Description {
    pub fn in_bounds(&self, row: i32, col: i32) -> bool {
        (0..self.rows).contains(&row) && (0..self.cols).contains(&col)
    }

    pub fn question_at(&self, row: i32, col: i32) -> Option<&QuestionField> {
        self.question_fields
            .iter()
            .find(|field| field.row == row && field.col == col)
    }

    /// A letter cell is any in-bounds coordinate that does not hold a question.
    pub fn is_letter_cell(&self, row: i32, col: i32) -> bool {
        self.in_bounds(row, col) && self.question_at(row, col).is_none()
    }

    /// Checks that a player may write at (row, col).
    pub fn check_writable(&self, row: i32, col: i32) -> Result<(), SyncError> {
        if !self.in_bounds(row, col) {
            return Err(SyncError::OutOfBounds { row, col });
        }
        if self.question_at(row, col).is_some() {
            return Err(SyncError::NotALetterCell { row, col });
        }
        Ok(())
    }

    /// The fields spelling out the prize word, left to right from its starting coordinate.
    pub fn prize_word_fields(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        let len = self.prize_word.position.chars().count() as i32;
        (0..len).map(move |offset| (self.prize_word.row, self.prize_word.col + offset))
    }

    /// 1-based index printed in the corner of prize cells. Prize word fields take precedence
    /// over prize fields.
    pub fn prize_index(&self, row: i32, col: i32) -> Option<usize> {
        if let Some(index) = self
            .prize_word_fields()
            .position(|(r, c)| r == row && c == col)
        {
            return Some(index + 1);
        }
        self.prize_fields
            .iter()
            .position(|field| field.row == row && field.col == col)
            .map(|index| index + 1)
    }
}

impl From<&ArrowWord> for PuzzleSummary {
    fn from(puzzle: &ArrowWord) -> Self {
        PuzzleSummary {
            id: puzzle.id,
            info: puzzle.info.clone(),
            difficulty: puzzle.difficulty.clone(),
        }
    }
}

/// Normalises a submitted cell value: a single letter is upper-cased, blank clears the cell.
pub fn normalize_value(raw: &str) -> Result<String, SyncError> {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Ok(String::new()),
        (Some(c), None) if c.is_ascii_alphabetic() => Ok(c.to_ascii_uppercase().to_string()),
        _ => Err(SyncError::InvalidValue(raw.to_string())),
    }
}

/// The puzzles a room can be created from.
#[derive(Debug, Clone)]
pub struct Catalog {
    puzzles: Arc<Vec<ArrowWord>>,
}

impl Catalog {
    /// Loads the catalog compiled into the binary.
    pub fn builtin() -> Result<Self, SyncError> {
        let puzzles: Vec<ArrowWord> = serde_json::from_str(BUILTIN_CATALOG)?;
        Ok(Self::new(puzzles))
    }

    pub fn new(mut puzzles: Vec<ArrowWord>) -> Self {
        // Newest first.
        puzzles.sort_by(|a, b| b.id.cmp(&a.id));
        Catalog {
            puzzles: Arc::new(puzzles),
        }
    }

    pub fn puzzles(&self) -> &[ArrowWord] {
        &self.puzzles
    }

    pub fn get(&self, id: u32) -> Option<&ArrowWord> {
        self.puzzles.iter().find(|puzzle| puzzle.id == id)
    }

    /// Resolves a puzzle selector as submitted by the room creation form.
    pub fn resolve(&self, selector: &str) -> Result<&ArrowWord, SyncError> {
        selector
            .trim()
            .parse::<u32>()
            .ok()
            .and_then(|id| self.get(id))
            .ok_or_else(|| SyncError::UnknownPuzzle(selector.to_string()))
    }

    pub fn summaries(&self) -> Vec<PuzzleSummary> {
        self.puzzles.iter().map(PuzzleSummary::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::builtin().expect("builtin catalog should parse")
    }

    #[test]
    fn test_builtin_catalog_is_sorted_newest_first() {
        let catalog = catalog();
        let ids: Vec<u32> = catalog.puzzles().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1043, 1042]);
        assert_eq!(catalog.summaries()[0].info, "Grille n°1043");
    }

    #[test]
    fn test_resolve() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("1042").unwrap().id, 1042);
        assert_eq!(catalog.resolve(" 1043 ").unwrap().id, 1043);
        assert!(matches!(
            catalog.resolve("9999"),
            Err(SyncError::UnknownPuzzle(_))
        ));
        assert!(matches!(
            catalog.resolve("not-a-number"),
            Err(SyncError::UnknownPuzzle(_))
        ));
    }

    #[test]
    fn test_document_field_names() {
        let catalog = catalog();
        let puzzle = catalog.get(1042).unwrap();
        assert_eq!(puzzle.kind, "ARROWWORD");
        assert_eq!(puzzle.metadata.puzzle_language, "fr");
        assert_eq!(puzzle.description.question_fields[0].arrow_type, ArrowType::Right);
        assert_eq!(puzzle.solution.answers[0].direction, Direction::Horizontal);

        let json = serde_json::to_value(puzzle).unwrap();
        assert!(json["description"]["questionFields"].is_array());
        assert_eq!(json["description"]["questionFields"][0]["arrowType"], "RIGHT");
        assert_eq!(json["type"], "ARROWWORD");
    }

    #[test]
    fn test_letter_cells() {
        let catalog = catalog();
        let description = &catalog.get(1042).unwrap().description;
        assert!(description.is_letter_cell(0, 1));
        assert!(!description.is_letter_cell(0, 0));
        assert!(!description.is_letter_cell(5, 1));
        assert!(!description.is_letter_cell(-1, 1));

        assert!(description.check_writable(4, 4).is_ok());
        assert!(matches!(
            description.check_writable(2, 0),
            Err(SyncError::NotALetterCell { row: 2, col: 0 })
        ));
        assert!(matches!(
            description.check_writable(0, 5),
            Err(SyncError::OutOfBounds { row: 0, col: 5 })
        ));
    }

    #[test]
    fn test_prize_index() {
        let catalog = catalog();
        let description = &catalog.get(1042).unwrap().description;
        let fields: Vec<(i32, i32)> = description.prize_word_fields().collect();
        assert_eq!(fields, vec![(4, 1), (4, 2), (4, 3), (4, 4)]);
        assert_eq!(description.prize_index(4, 3), Some(3));
        assert_eq!(description.prize_index(2, 2), Some(3));
        assert_eq!(description.prize_index(1, 4), Some(4));
        assert_eq!(description.prize_index(1, 1), None);
    }

    #[test]
    fn test_question_display_text() {
        let catalog = catalog();
        let question = &catalog.get(1042).unwrap().description.question_fields[2];
        assert_eq!(question.display_text(), "Terres\nentourées\nd'eau");
        assert_eq!(question.arrow_type.css_class(), "arrow-right");
    }

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value("a").unwrap(), "A");
        assert_eq!(normalize_value(" Z ").unwrap(), "Z");
        assert_eq!(normalize_value("").unwrap(), "");
        assert_eq!(normalize_value("   ").unwrap(), "");
        assert!(matches!(
            normalize_value("AB"),
            Err(SyncError::InvalidValue(_))
        ));
        assert!(normalize_value("7").is_err());
        assert!(normalize_value("é").is_err());
    }
}
