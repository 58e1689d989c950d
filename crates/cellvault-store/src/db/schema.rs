use rusqlite::Connection;

pub(crate) fn init(conn: &Connection) -> rusqlite::Result<()> {
    // Foreign keys are off by default in SQLite
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS workbooks (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          file_path TEXT NOT NULL UNIQUE,
          file_size INTEGER,
          content_hash TEXT,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS file_versions (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          workbook_id INTEGER NOT NULL REFERENCES workbooks(id) ON DELETE CASCADE,
          version_number INTEGER NOT NULL,
          change_description TEXT NOT NULL DEFAULT '',
          consolidated_snapshot JSON,
          document BLOB,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL,
          UNIQUE (workbook_id, version_number)
        );

        CREATE TABLE IF NOT EXISTS chunks (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          version_id INTEGER NOT NULL REFERENCES file_versions(id) ON DELETE CASCADE,
          chunk_index INTEGER NOT NULL,
          sheet_name TEXT NOT NULL,
          start_row INTEGER NOT NULL,
          end_row INTEGER NOT NULL,
          payload JSON NOT NULL,
          rollup_text TEXT NOT NULL DEFAULT '',
          content_hash TEXT NOT NULL,
          modified INTEGER NOT NULL DEFAULT 0,
          UNIQUE (version_id, chunk_index, sheet_name)
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_version_sheet_rows
          ON chunks(version_id, sheet_name, start_row, end_row);

        CREATE TABLE IF NOT EXISTS cells (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          version_id INTEGER NOT NULL REFERENCES file_versions(id) ON DELETE CASCADE,
          chunk_id INTEGER NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
          sheet_name TEXT NOT NULL,
          cell_address TEXT NOT NULL,
          payload JSON NOT NULL,
          content_hash TEXT NOT NULL,
          UNIQUE (version_id, sheet_name, cell_address)
        );

        CREATE INDEX IF NOT EXISTS idx_cells_chunk ON cells(chunk_id);

        CREATE TABLE IF NOT EXISTS pending_edits (
          id TEXT PRIMARY KEY,
          version_id INTEGER NOT NULL REFERENCES file_versions(id) ON DELETE CASCADE,
          file_path TEXT NOT NULL,
          sheet_name TEXT NOT NULL,
          cell_address TEXT NOT NULL,
          original_state JSON NOT NULL,
          proposed JSON NOT NULL,
          intended_fill TEXT,
          created_at TEXT NOT NULL,
          status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending','accepted','rejected'))
        );

        CREATE INDEX IF NOT EXISTS idx_pending_edits_status ON pending_edits(status);
        "#,
    )?;

    Ok(())
}
