#![cfg(feature = "ssr")]

use arrow_words::notifier::ChangeNotifier;
use arrow_words::puzzle::Catalog;
use arrow_words::{create_room_from_catalog, establish_pool, list_cells, run_migrations, submit_cell};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

type DbPool = Pool<ConnectionManager<SqliteConnection>>;

// A file-backed database so several pooled connections see the same data.
fn setup() -> (TempDir, DbPool, String) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = dir.path().join("rooms.db").to_string_lossy().into_owned();
    let pool = establish_pool(&url).expect("Failed to create pool");
    let mut conn = pool.get().expect("Failed to get connection");
    run_migrations(&mut conn).expect("Failed to run migrations");
    let room = create_room_from_catalog(&mut conn, &Catalog::builtin().unwrap(), "1042")
        .expect("Failed to create room");
    (dir, pool, room.id)
}

#[test]
fn test_writes_to_different_cells_are_independent() {
    let (_dir, pool, room_id) = setup();
    let notifier = ChangeNotifier::new();
    // Letter cells of the first column after the questions.
    let writes = [(0, 1, "C"), (1, 1, "R"), (2, 1, "I"), (3, 1, "N")];
    let barrier = Arc::new(Barrier::new(writes.len()));

    thread::scope(|scope| {
        for (row, col, value) in writes {
            let pool = pool.clone();
            let notifier = notifier.clone();
            let barrier = Arc::clone(&barrier);
            let room_id = room_id.clone();
            scope.spawn(move || {
                let mut conn = pool.get().unwrap();
                barrier.wait();
                submit_cell(&mut conn, &notifier, &room_id, row, col, value).unwrap();
            });
        }
    });

    let mut conn = pool.get().unwrap();
    let mut cells = list_cells(&mut conn, &room_id).unwrap();
    cells.sort_by_key(|cell| (cell.row, cell.col));
    let stored: Vec<(i32, i32, String)> = cells
        .into_iter()
        .map(|cell| (cell.row, cell.col, cell.value))
        .collect();
    assert_eq!(
        stored,
        writes
            .iter()
            .map(|(row, col, value)| (*row, *col, value.to_string()))
            .collect::<Vec<_>>()
    );
}

#[test]
fn test_racing_writes_to_one_cell_leave_a_single_row() {
    let (_dir, pool, room_id) = setup();
    let notifier = ChangeNotifier::new();
    let barrier = Arc::new(Barrier::new(2));

    let cell_ids: Vec<String> = thread::scope(|scope| {
        let handles: Vec<_> = ["A", "B"]
            .into_iter()
            .map(|value| {
                let pool = pool.clone();
                let notifier = notifier.clone();
                let barrier = Arc::clone(&barrier);
                let room_id = room_id.clone();
                scope.spawn(move || {
                    let mut conn = pool.get().unwrap();
                    barrier.wait();
                    submit_cell(&mut conn, &notifier, &room_id, 0, 1, value)
                        .unwrap()
                        .cell_id
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    // Both writers were told about the same cell.
    assert_eq!(cell_ids[0], cell_ids[1]);

    let mut conn = pool.get().unwrap();
    let cells = list_cells(&mut conn, &room_id).unwrap();
    assert_eq!(cells.len(), 1);
    assert!(cells[0].value == "A" || cells[0].value == "B");
}
