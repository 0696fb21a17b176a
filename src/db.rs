use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "curriculum.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS levels(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tracks(
            id TEXT PRIMARY KEY,
            level_id TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(level_id) REFERENCES levels(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tracks_level ON tracks(level_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS units(
            id TEXT PRIMARY KEY,
            track_id TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(track_id) REFERENCES tracks(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_units_track ON units(track_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS chapters(
            id TEXT PRIMARY KEY,
            unit_id TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(unit_id) REFERENCES units(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_chapters_unit ON chapters(unit_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS objectives(
            id TEXT PRIMARY KEY,
            chapter_id TEXT NOT NULL,
            text TEXT NOT NULL,
            FOREIGN KEY(chapter_id) REFERENCES chapters(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_objectives_chapter ON objectives(chapter_id)",
        [],
    )?;

    // Master sequence/activity/evaluation records plan items may link to.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS masters(
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_masters_kind ON masters(kind)",
        [],
    )?;

    // sort_order persists the in-memory order field verbatim (1-based,
    // contiguous per chapter).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS plan_items(
            id TEXT PRIMARY KEY,
            chapter_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            source_id TEXT,
            planned_date TEXT,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(chapter_id) REFERENCES chapters(id)
        )",
        [],
    )?;
    ensure_plan_items_planned_date(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_plan_items_chapter ON plan_items(chapter_id, sort_order)",
        [],
    )?;

    // Saved composite state: one row per chapter with the hierarchy snapshot
    // it was planned under and the selected objective ids as a JSON array.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS chapter_plans(
            chapter_id TEXT PRIMARY KEY,
            level_id TEXT,
            track_id TEXT,
            unit_id TEXT,
            objective_ids_json TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT,
            FOREIGN KEY(chapter_id) REFERENCES chapters(id)
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_plan_items_planned_date(conn: &Connection) -> anyhow::Result<()> {
    // Workspaces created before plan items carried a planned date.
    if table_has_column(conn, "plan_items", "planned_date")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE plan_items ADD COLUMN planned_date TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
