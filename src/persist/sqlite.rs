//! SQLite-backed relational content store.

use std::path::Path;

use hashbrown::HashMap;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{
    record::{
        ClassroomInfo, ClassroomKind, ClassroomRecord, LessonDraft, LessonFields, LessonRecord,
        ModuleDraft, ModuleFields, ModuleRecord, Placement, Pricing, ResourceDraft, ResourceKind,
        ResourceRecord, StoredClassroom, StoredLesson, StoredModule,
    },
    types::RowId,
};

use super::{ContentStore, StoreResult};

/// SQLite implementation of [`crate::persist::ContentStore`].
pub struct SqliteContentStore {
    conn: Connection,
}

impl SqliteContentStore {
    /// Opens or creates a database at `path`.
    ///
    /// Enables WAL mode, `synchronous=NORMAL` and foreign keys.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Creates a classroom row. Classroom lifecycle is otherwise managed
    /// outside this crate.
    pub fn create_classroom(&mut self, info: &ClassroomInfo, draft: bool) -> StoreResult<RowId> {
        self.conn.execute(
            "INSERT INTO classrooms(name, description, kind, price_cents, currency, draft)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                info.name,
                info.description,
                info.kind.as_str(),
                info.pricing.amount_cents,
                info.pricing.currency,
                draft,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Counts rows of one table; used by diagnostics and tests.
    pub fn count_rows(&self, table: Table) -> StoreResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    fn placement(&self, sql: &str, id: RowId) -> StoreResult<Option<Placement>> {
        Ok(self
            .conn
            .query_row(sql, params![id], |row| {
                Ok(Placement {
                    parent: row.get(0)?,
                    position: row.get(1)?,
                })
            })
            .optional()?)
    }

    fn delete(&mut self, sql: &str, classroom_id: RowId, id: RowId) -> StoreResult<bool> {
        Ok(self.conn.execute(sql, params![id, classroom_id])? > 0)
    }
}

/// Content tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// `classrooms`.
    Classrooms,
    /// `modules`.
    Modules,
    /// `lessons`.
    Lessons,
    /// `resources`.
    Resources,
}

impl Table {
    fn name(self) -> &'static str {
        match self {
            Self::Classrooms => "classrooms",
            Self::Modules => "modules",
            Self::Lessons => "lessons",
            Self::Resources => "resources",
        }
    }
}

impl ContentStore for SqliteContentStore {
    fn classroom(&self, id: RowId) -> StoreResult<Option<ClassroomRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, description, kind, price_cents, currency, draft, cover_url
                 FROM classrooms WHERE id = ?1",
                params![id],
                classroom_from_row,
            )
            .optional()?)
    }

    fn update_classroom_info(&mut self, id: RowId, info: &ClassroomInfo) -> StoreResult<bool> {
        let n = self.conn.execute(
            "UPDATE classrooms SET name = ?2, description = ?3, kind = ?4, price_cents = ?5,
             currency = ?6 WHERE id = ?1",
            params![
                id,
                info.name,
                info.description,
                info.kind.as_str(),
                info.pricing.amount_cents,
                info.pricing.currency,
            ],
        )?;
        Ok(n > 0)
    }

    fn set_classroom_draft(&mut self, id: RowId, draft: bool) -> StoreResult<bool> {
        let n = self.conn.execute(
            "UPDATE classrooms SET draft = ?2 WHERE id = ?1",
            params![id, draft],
        )?;
        Ok(n > 0)
    }

    fn set_classroom_cover(&mut self, id: RowId, url: &str) -> StoreResult<bool> {
        let n = self.conn.execute(
            "UPDATE classrooms SET cover_url = ?2 WHERE id = ?1",
            params![id, url],
        )?;
        Ok(n > 0)
    }

    fn insert_module(&mut self, draft: &ModuleDraft) -> StoreResult<RowId> {
        self.conn.execute(
            "INSERT INTO modules(classroom_id, position, name, description) VALUES (?1, ?2, ?3, ?4)",
            params![
                draft.classroom_id,
                draft.position,
                draft.fields.name,
                draft.fields.description,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_module(
        &mut self,
        id: RowId,
        placement: Placement,
        fields: &ModuleFields,
    ) -> StoreResult<bool> {
        let n = self.conn.execute(
            "UPDATE modules SET position = ?3, name = ?4, description = ?5
             WHERE id = ?1 AND classroom_id = ?2",
            params![id, placement.parent, placement.position, fields.name, fields.description],
        )?;
        Ok(n > 0)
    }

    fn update_module_position(&mut self, id: RowId, placement: Placement) -> StoreResult<bool> {
        let n = self.conn.execute(
            "UPDATE modules SET position = ?3 WHERE id = ?1 AND classroom_id = ?2",
            params![id, placement.parent, placement.position],
        )?;
        Ok(n > 0)
    }

    fn module_placement(&self, id: RowId) -> StoreResult<Option<Placement>> {
        self.placement("SELECT classroom_id, position FROM modules WHERE id = ?1", id)
    }

    fn delete_module(&mut self, classroom_id: RowId, id: RowId) -> StoreResult<bool> {
        self.delete(
            "DELETE FROM modules WHERE id = ?1 AND classroom_id = ?2",
            classroom_id,
            id,
        )
    }

    fn insert_lesson(&mut self, draft: &LessonDraft) -> StoreResult<RowId> {
        self.conn.execute(
            "INSERT INTO lessons(module_id, position, name, video_url, video_type, text_content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                draft.module_id,
                draft.position,
                draft.fields.name,
                draft.fields.video_url,
                draft.fields.video_type,
                draft.fields.text_content,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_lesson(
        &mut self,
        classroom_id: RowId,
        id: RowId,
        placement: Placement,
        fields: &LessonFields,
    ) -> StoreResult<bool> {
        let n = self.conn.execute(
            "UPDATE lessons SET module_id = ?3, position = ?4, name = ?5, video_url = ?6,
             video_type = ?7, text_content = ?8
             WHERE id = ?1
               AND module_id IN (SELECT id FROM modules WHERE classroom_id = ?2)
               AND ?3 IN (SELECT id FROM modules WHERE classroom_id = ?2)",
            params![
                id,
                classroom_id,
                placement.parent,
                placement.position,
                fields.name,
                fields.video_url,
                fields.video_type,
                fields.text_content,
            ],
        )?;
        Ok(n > 0)
    }

    fn move_lesson(
        &mut self,
        classroom_id: RowId,
        id: RowId,
        placement: Placement,
    ) -> StoreResult<bool> {
        let n = self.conn.execute(
            "UPDATE lessons SET module_id = ?3, position = ?4
             WHERE id = ?1
               AND module_id IN (SELECT id FROM modules WHERE classroom_id = ?2)
               AND ?3 IN (SELECT id FROM modules WHERE classroom_id = ?2)",
            params![id, classroom_id, placement.parent, placement.position],
        )?;
        Ok(n > 0)
    }

    fn lesson_placement(&self, id: RowId) -> StoreResult<Option<Placement>> {
        self.placement("SELECT module_id, position FROM lessons WHERE id = ?1", id)
    }

    fn delete_lesson(&mut self, classroom_id: RowId, id: RowId) -> StoreResult<bool> {
        self.delete(
            "DELETE FROM lessons
             WHERE id = ?1 AND module_id IN (SELECT id FROM modules WHERE classroom_id = ?2)",
            classroom_id,
            id,
        )
    }

    fn insert_resource(&mut self, draft: &ResourceDraft) -> StoreResult<RowId> {
        self.conn.execute(
            "INSERT INTO resources(lesson_id, position, kind, url, display_name, file_type, file_size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                draft.lesson_id,
                draft.position,
                draft.kind.as_str(),
                draft.url,
                draft.display_name,
                draft.file_type,
                draft.file_size,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_resource_position(
        &mut self,
        classroom_id: RowId,
        id: RowId,
        position: i64,
    ) -> StoreResult<bool> {
        let n = self.conn.execute(
            "UPDATE resources SET position = ?3 WHERE id = ?1 AND lesson_id IN (
                SELECT l.id FROM lessons l JOIN modules m ON m.id = l.module_id
                WHERE m.classroom_id = ?2)",
            params![id, classroom_id, position],
        )?;
        Ok(n > 0)
    }

    fn resource_placement(&self, id: RowId) -> StoreResult<Option<Placement>> {
        self.placement("SELECT lesson_id, position FROM resources WHERE id = ?1", id)
    }

    fn delete_resource(&mut self, classroom_id: RowId, id: RowId) -> StoreResult<bool> {
        self.delete(
            "DELETE FROM resources WHERE id = ?1 AND lesson_id IN (
                SELECT l.id FROM lessons l JOIN modules m ON m.id = l.module_id
                WHERE m.classroom_id = ?2)",
            classroom_id,
            id,
        )
    }

    fn load_classroom(&self, id: RowId) -> StoreResult<Option<StoredClassroom>> {
        let Some(classroom) = self.classroom(id)? else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.lesson_id, r.position, r.kind, r.url, r.display_name, r.file_type, r.file_size
             FROM resources r
             JOIN lessons l ON l.id = r.lesson_id
             JOIN modules m ON m.id = l.module_id
             WHERE m.classroom_id = ?1
             ORDER BY r.position ASC, r.id ASC",
        )?;
        let mut resources: HashMap<RowId, Vec<ResourceRecord>> = HashMap::new();
        for row in stmt.query_map(params![id], resource_from_row)? {
            let row = row?;
            resources.entry(row.lesson_id).or_default().push(row);
        }

        let mut stmt = self.conn.prepare(
            "SELECT l.id, l.module_id, l.position, l.name, l.video_url, l.video_type, l.text_content
             FROM lessons l
             JOIN modules m ON m.id = l.module_id
             WHERE m.classroom_id = ?1
             ORDER BY l.position ASC, l.id ASC",
        )?;
        let mut lessons: HashMap<RowId, Vec<StoredLesson>> = HashMap::new();
        for row in stmt.query_map(params![id], lesson_from_row)? {
            let record = row?;
            let resources = resources.remove(&record.id).unwrap_or_default();
            lessons
                .entry(record.module_id)
                .or_default()
                .push(StoredLesson { record, resources });
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, classroom_id, position, name, description FROM modules
             WHERE classroom_id = ?1 ORDER BY position ASC, id ASC",
        )?;
        let mut modules = Vec::new();
        for row in stmt.query_map(params![id], module_from_row)? {
            let record = row?;
            let lessons = lessons.remove(&record.id).unwrap_or_default();
            modules.push(StoredModule { record, lessons });
        }

        Ok(Some(StoredClassroom { classroom, modules }))
    }
}

fn classroom_from_row(row: &Row<'_>) -> rusqlite::Result<ClassroomRecord> {
    let kind: String = row.get(3)?;
    Ok(ClassroomRecord {
        id: row.get(0)?,
        info: ClassroomInfo {
            name: row.get(1)?,
            description: row.get(2)?,
            kind: ClassroomKind::from_column(&kind),
            pricing: Pricing {
                amount_cents: row.get(4)?,
                currency: row.get(5)?,
            },
        },
        draft: row.get(6)?,
        cover_url: row.get(7)?,
    })
}

fn module_from_row(row: &Row<'_>) -> rusqlite::Result<ModuleRecord> {
    Ok(ModuleRecord {
        id: row.get(0)?,
        classroom_id: row.get(1)?,
        position: row.get(2)?,
        fields: ModuleFields {
            name: row.get(3)?,
            description: row.get(4)?,
        },
    })
}

fn lesson_from_row(row: &Row<'_>) -> rusqlite::Result<LessonRecord> {
    Ok(LessonRecord {
        id: row.get(0)?,
        module_id: row.get(1)?,
        position: row.get(2)?,
        fields: LessonFields {
            name: row.get(3)?,
            video_url: row.get(4)?,
            video_type: row.get(5)?,
            text_content: row.get(6)?,
        },
    })
}

fn resource_from_row(row: &Row<'_>) -> rusqlite::Result<ResourceRecord> {
    let kind: String = row.get(3)?;
    Ok(ResourceRecord {
        id: row.get(0)?,
        lesson_id: row.get(1)?,
        position: row.get(2)?,
        kind: ResourceKind::from_column(&kind),
        url: row.get(4)?,
        display_name: row.get(5)?,
        file_type: row.get(6)?,
        file_size: row.get(7)?,
    })
}
