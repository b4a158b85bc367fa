use super::store::Store;
use crate::errors::Result;
use crate::resolve::FileStore;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

impl Store {
    /// Stores (or replaces) an attachment and returns its sha256.
    pub fn put_file(&self, name: &str, content: &[u8]) -> Result<String> {
        let digest = hex::encode(Sha256::digest(content));
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO files (name, content, sha256, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET content = excluded.content, sha256 = excluded.sha256,
                                             created_at = excluded.created_at",
            params![name, content, digest, super::now_ts()],
        )?;
        Ok(digest)
    }

    pub fn get_file(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT content FROM files WHERE name = ?1",
                params![name],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?)
    }
}

impl FileStore for Store {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        self.get_file(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get() {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        let digest = s.put_file("menu.txt", b"soup").unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(FileStore::get(&s, "menu.txt").unwrap(), Some(b"soup".to_vec()));
        assert_eq!(FileStore::get(&s, "other.txt").unwrap(), None);
    }
}
