use super::store::{json_col, to_json, Store};
use crate::errors::{EngineError, Result};
use crate::model::Template;
use rusqlite::{params, OptionalExtension};

impl Store {
    /// Inserts or replaces a template. Validation happens before anything is written.
    pub fn put_template(&self, template: &Template) -> Result<()> {
        template.validate()?;
        let doc = to_json(template)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO templates (id, kind, doc_json, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET kind = excluded.kind, doc_json = excluded.doc_json,
                                           updated_at = excluded.updated_at",
            params![template.id, template.kind.as_str(), doc, super::now_ts()],
        )?;
        Ok(())
    }

    pub fn get_template(&self, id: &str) -> Result<Template> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT doc_json FROM templates WHERE id = ?1",
            params![id],
            |row| json_col::<Template>(row, 0),
        )
        .optional()?
        .ok_or_else(|| EngineError::not_found("template", id))
    }

    pub fn list_templates(&self) -> Result<Vec<Template>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT doc_json FROM templates ORDER BY id")?;
        let rows = stmt.query_map([], |row| json_col::<Template>(row, 0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Runs keep their own snapshot, so deleting a template never touches them.
    pub fn delete_template(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM templates WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(EngineError::not_found("template", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TemplateKind;

    fn template(id: &str) -> Template {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "request": {"url": "http://svc/{{path}}"},
            "cases": [{"values": {"path": "a"}}]
        }))
        .unwrap()
    }

    #[test]
    fn put_get_list_delete() {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();

        store.put_template(&template("b")).unwrap();
        store.put_template(&template("a")).unwrap();
        let mut updated = template("a");
        updated.cases.push(Default::default());
        store.put_template(&updated).unwrap();

        assert_eq!(store.get_template("a").unwrap().cases.len(), 2);
        let ids: Vec<_> = store.list_templates().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        store.delete_template("a").unwrap();
        assert!(matches!(
            store.get_template("a"),
            Err(EngineError::NotFound { .. })
        ));
        assert!(store.delete_template("a").is_err());
    }

    #[test]
    fn invalid_template_is_not_stored() {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        let mut t = template("m");
        t.kind = TemplateKind::Mission;
        t.request = None;
        assert!(store.put_template(&t).is_err());
        assert!(store.list_templates().unwrap().is_empty());
    }
}
