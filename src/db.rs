use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use crate::model::{Assignment, Category, Class, ClassTree, Grade};
use crate::repo::{
    self, CategoryPatch, ChangeEvent, ChangeKind, ClassPatch, ClassTreeSource, GradeStore,
    NewAssignment, NewCategory, NewClass, RepoError, Subscribers,
};

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    migrate(&conn)?;
    Ok(conn)
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            name TEXT NOT NULL,
            credit_hours REAL NOT NULL,
            is_completed INTEGER NOT NULL DEFAULT 0,
            term TEXT,
            sort_order INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_student ON classes(student_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            weight REAL NOT NULL,
            color TEXT,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_categories_class ON categories(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            category_id TEXT NOT NULL,
            name TEXT NOT NULL,
            points_possible REAL NOT NULL,
            due_date TEXT,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(category_id) REFERENCES categories(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_class ON assignments(class_id)",
        [],
    )?;

    // One grade per assignment; clearing a grade deletes the row.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            assignment_id TEXT PRIMARY KEY,
            points_earned REAL NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn settings_delete(conn: &Connection, key: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM settings WHERE key = ?", [key])?;
    Ok(n > 0)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Repository over one workspace connection. Writes announce themselves to
/// `subscribers` once they have committed.
pub struct SqliteRepo<'a> {
    conn: &'a Connection,
    subscribers: &'a Subscribers,
}

impl<'a> SqliteRepo<'a> {
    pub fn new(conn: &'a Connection, subscribers: &'a Subscribers) -> Self {
        Self { conn, subscribers }
    }

    fn announce(&self, student_id: String, class_id: String, kind: ChangeKind) {
        tracing::debug!(%student_id, %class_id, ?kind, "gradebook changed");
        self.subscribers.notify(&ChangeEvent {
            student_id,
            class_id,
            kind,
        });
    }

    fn load_class(&self, class_id: &str) -> Result<(String, Class), RepoError> {
        self.conn
            .query_row(
                "SELECT student_id, id, name, credit_hours, is_completed, term
                 FROM classes WHERE id = ?",
                [class_id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        Class {
                            id: r.get(1)?,
                            name: r.get(2)?,
                            credit_hours: r.get(3)?,
                            is_completed: r.get::<_, i64>(4)? != 0,
                            term: r.get(5)?,
                        },
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| RepoError::not_found("class", class_id))
    }

    /// (student_id, class_id, category)
    fn load_category(&self, category_id: &str) -> Result<(String, String, Category), RepoError> {
        self.conn
            .query_row(
                "SELECT c.student_id, cat.class_id, cat.id, cat.name, cat.weight, cat.color
                 FROM categories cat
                 JOIN classes c ON c.id = cat.class_id
                 WHERE cat.id = ?",
                [category_id],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        Category {
                            id: r.get(2)?,
                            name: r.get(3)?,
                            weight: r.get(4)?,
                            color: r.get(5)?,
                        },
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| RepoError::not_found("category", category_id))
    }

    /// (student_id, class_id, points_possible)
    fn load_assignment_owner(
        &self,
        assignment_id: &str,
    ) -> Result<(String, String, f64), RepoError> {
        self.conn
            .query_row(
                "SELECT c.student_id, a.class_id, a.points_possible
                 FROM assignments a
                 JOIN classes c ON c.id = a.class_id
                 WHERE a.id = ?",
                [assignment_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?
            .ok_or_else(|| RepoError::not_found("assignment", assignment_id))
    }

    fn next_sort_order(&self, table: &str, class_col: &str, id: &str) -> Result<i64, RepoError> {
        let sql = format!(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM {table} WHERE {class_col} = ?"
        );
        Ok(self.conn.query_row(&sql, [id], |r| r.get(0))?)
    }

    pub fn list_classes(&self, student_id: &str) -> Result<Vec<Class>, RepoError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, credit_hours, is_completed, term
             FROM classes
             WHERE student_id = ?
             ORDER BY sort_order, name",
        )?;
        let classes = stmt
            .query_map([student_id], |r| {
                Ok(Class {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    credit_hours: r.get(2)?,
                    is_completed: r.get::<_, i64>(3)? != 0,
                    term: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(classes)
    }

    pub fn class_owner(&self, class_id: &str) -> Result<String, RepoError> {
        Ok(self.load_class(class_id)?.0)
    }
}

impl ClassTreeSource for SqliteRepo<'_> {
    fn fetch_class_grade_tree(&self, student_id: &str) -> Result<Vec<ClassTree>, RepoError> {
        // Read under one transaction so classes, categories and grades agree.
        let tx = self.conn.unchecked_transaction()?;

        let classes = self.list_classes(student_id)?;
        let mut trees: Vec<ClassTree> = classes
            .into_iter()
            .map(|class| ClassTree {
                class,
                categories: Vec::new(),
                assignments: Vec::new(),
            })
            .collect();
        let index_by_class: HashMap<String, usize> = trees
            .iter()
            .enumerate()
            .map(|(i, t)| (t.class.id.clone(), i))
            .collect();

        let mut cat_stmt = tx.prepare(
            "SELECT cat.class_id, cat.id, cat.name, cat.weight, cat.color
             FROM categories cat
             JOIN classes c ON c.id = cat.class_id
             WHERE c.student_id = ?
             ORDER BY cat.sort_order",
        )?;
        let categories = cat_stmt
            .query_map([student_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    Category {
                        id: r.get(1)?,
                        name: r.get(2)?,
                        weight: r.get(3)?,
                        color: r.get(4)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (class_id, category) in categories {
            if let Some(i) = index_by_class.get(&class_id) {
                trees[*i].categories.push(category);
            }
        }

        let mut assignment_stmt = tx.prepare(
            "SELECT a.class_id, a.id, a.name, a.category_id, a.points_possible, a.due_date,
                    g.points_earned, g.updated_at
             FROM assignments a
             JOIN classes c ON c.id = a.class_id
             LEFT JOIN grades g ON g.assignment_id = a.id
             WHERE c.student_id = ?
             ORDER BY a.sort_order",
        )?;
        let assignments = assignment_stmt
            .query_map([student_id], |r| {
                let points_earned: Option<f64> = r.get(6)?;
                let updated_at: Option<String> = r.get(7)?;
                Ok((
                    r.get::<_, String>(0)?,
                    Assignment {
                        id: r.get(1)?,
                        name: r.get(2)?,
                        category_id: r.get(3)?,
                        points_possible: r.get(4)?,
                        due_date: r.get(5)?,
                        grade: points_earned.map(|points_earned| Grade {
                            points_earned,
                            updated_at,
                        }),
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (class_id, assignment) in assignments {
            if let Some(i) = index_by_class.get(&class_id) {
                trees[*i].assignments.push(assignment);
            }
        }

        drop(assignment_stmt);
        drop(cat_stmt);
        tx.commit()?;
        Ok(trees)
    }
}

impl GradeStore for SqliteRepo<'_> {
    fn create_class(&self, student_id: &str, new: NewClass) -> Result<Class, RepoError> {
        let student_id = repo::validate_name("studentId", student_id)?;
        let class = Class {
            id: Uuid::new_v4().to_string(),
            name: repo::validate_name("name", &new.name)?,
            credit_hours: repo::validate_positive("creditHours", new.credit_hours)?,
            is_completed: new.is_completed,
            term: new.term.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        };
        let sort_order: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM classes WHERE student_id = ?",
            [&student_id],
            |r| r.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO classes(
                id, student_id, name, credit_hours, is_completed, term, sort_order, created_at
             )
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &class.id,
                &student_id,
                &class.name,
                class.credit_hours,
                class.is_completed as i64,
                &class.term,
                sort_order,
                now_rfc3339(),
            ),
        )?;
        self.announce(student_id, class.id.clone(), ChangeKind::Class);
        Ok(class)
    }

    fn update_class(&self, class_id: &str, patch: ClassPatch) -> Result<Class, RepoError> {
        let (student_id, mut class) = self.load_class(class_id)?;
        if let Some(name) = patch.name {
            class.name = repo::validate_name("name", &name)?;
        }
        if let Some(h) = patch.credit_hours {
            class.credit_hours = repo::validate_positive("creditHours", h)?;
        }
        if let Some(done) = patch.is_completed {
            class.is_completed = done;
        }
        if let Some(term) = patch.term {
            class.term = term.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        }
        self.conn.execute(
            "UPDATE classes SET name = ?, credit_hours = ?, is_completed = ?, term = ?
             WHERE id = ?",
            (
                &class.name,
                class.credit_hours,
                class.is_completed as i64,
                &class.term,
                &class.id,
            ),
        )?;
        self.announce(student_id, class.id.clone(), ChangeKind::Class);
        Ok(class)
    }

    fn delete_class(&self, class_id: &str) -> Result<(), RepoError> {
        let (student_id, _) = self.load_class(class_id)?;

        // Explicit dependency order; no ON DELETE CASCADE.
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM grades
             WHERE assignment_id IN (SELECT id FROM assignments WHERE class_id = ?)",
            [class_id],
        )?;
        tx.execute("DELETE FROM assignments WHERE class_id = ?", [class_id])?;
        tx.execute("DELETE FROM categories WHERE class_id = ?", [class_id])?;
        tx.execute("DELETE FROM classes WHERE id = ?", [class_id])?;
        tx.commit()?;

        self.announce(student_id, class_id.to_string(), ChangeKind::Class);
        Ok(())
    }

    fn create_category(&self, class_id: &str, new: NewCategory) -> Result<Category, RepoError> {
        let (student_id, _) = self.load_class(class_id)?;
        let category = Category {
            id: Uuid::new_v4().to_string(),
            name: repo::validate_name("name", &new.name)?,
            weight: repo::validate_weight(new.weight)?,
            color: new.color.filter(|c| !c.trim().is_empty()),
        };
        let sort_order = self.next_sort_order("categories", "class_id", class_id)?;
        self.conn.execute(
            "INSERT INTO categories(id, class_id, name, weight, color, sort_order)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &category.id,
                class_id,
                &category.name,
                category.weight,
                &category.color,
                sort_order,
            ),
        )?;
        self.announce(student_id, class_id.to_string(), ChangeKind::Category);
        Ok(category)
    }

    fn update_category(
        &self,
        category_id: &str,
        patch: CategoryPatch,
    ) -> Result<Category, RepoError> {
        let (student_id, class_id, mut category) = self.load_category(category_id)?;
        if let Some(name) = patch.name {
            category.name = repo::validate_name("name", &name)?;
        }
        if let Some(w) = patch.weight {
            category.weight = repo::validate_weight(w)?;
        }
        if let Some(color) = patch.color {
            category.color = color.filter(|c| !c.trim().is_empty());
        }
        self.conn.execute(
            "UPDATE categories SET name = ?, weight = ?, color = ? WHERE id = ?",
            (&category.name, category.weight, &category.color, &category.id),
        )?;
        self.announce(student_id, class_id, ChangeKind::Category);
        Ok(category)
    }

    fn delete_category(&self, category_id: &str) -> Result<(), RepoError> {
        let (student_id, class_id, _) = self.load_category(category_id)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM grades
             WHERE assignment_id IN (SELECT id FROM assignments WHERE category_id = ?)",
            [category_id],
        )?;
        tx.execute("DELETE FROM assignments WHERE category_id = ?", [category_id])?;
        tx.execute("DELETE FROM categories WHERE id = ?", [category_id])?;
        tx.commit()?;

        self.announce(student_id, class_id, ChangeKind::Category);
        Ok(())
    }

    fn create_assignment(
        &self,
        class_id: &str,
        new: NewAssignment,
    ) -> Result<Assignment, RepoError> {
        let (student_id, _) = self.load_class(class_id)?;
        let (_, category_class_id, _) = self.load_category(&new.category_id)?;
        if category_class_id != class_id {
            return Err(RepoError::InvalidInput(
                "categoryId belongs to a different class".to_string(),
            ));
        }
        let assignment = Assignment {
            id: Uuid::new_v4().to_string(),
            name: repo::validate_name("name", &new.name)?,
            category_id: new.category_id,
            points_possible: repo::validate_positive("pointsPossible", new.points_possible)?,
            due_date: new.due_date.filter(|d| !d.trim().is_empty()),
            grade: None,
        };
        let sort_order = self.next_sort_order("assignments", "class_id", class_id)?;
        self.conn.execute(
            "INSERT INTO assignments(
                id, class_id, category_id, name, points_possible, due_date, sort_order
             )
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &assignment.id,
                class_id,
                &assignment.category_id,
                &assignment.name,
                assignment.points_possible,
                &assignment.due_date,
                sort_order,
            ),
        )?;
        self.announce(student_id, class_id.to_string(), ChangeKind::Assignment);
        Ok(assignment)
    }

    fn delete_assignment(&self, assignment_id: &str) -> Result<(), RepoError> {
        let (student_id, class_id, _) = self.load_assignment_owner(assignment_id)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM grades WHERE assignment_id = ?", [assignment_id])?;
        tx.execute("DELETE FROM assignments WHERE id = ?", [assignment_id])?;
        tx.commit()?;

        self.announce(student_id, class_id, ChangeKind::Assignment);
        Ok(())
    }

    fn set_grade(&self, assignment_id: &str, points_earned: f64) -> Result<Grade, RepoError> {
        let (student_id, class_id, _) = self.load_assignment_owner(assignment_id)?;
        let grade = Grade {
            points_earned: repo::validate_points_earned(points_earned)?,
            updated_at: Some(now_rfc3339()),
        };
        self.conn.execute(
            "INSERT INTO grades(assignment_id, points_earned, updated_at) VALUES(?, ?, ?)
             ON CONFLICT(assignment_id) DO UPDATE SET
               points_earned = excluded.points_earned,
               updated_at = excluded.updated_at",
            (assignment_id, grade.points_earned, &grade.updated_at),
        )?;
        self.announce(student_id, class_id, ChangeKind::Grade);
        Ok(grade)
    }

    fn clear_grade(&self, assignment_id: &str) -> Result<bool, RepoError> {
        let (student_id, class_id, _) = self.load_assignment_owner(assignment_id)?;
        let n = self
            .conn
            .execute("DELETE FROM grades WHERE assignment_id = ?", [assignment_id])?;
        if n > 0 {
            self.announce(student_id, class_id, ChangeKind::Grade);
        }
        Ok(n > 0)
    }
}
