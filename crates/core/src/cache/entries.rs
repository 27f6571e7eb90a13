//! Cache store operations on the SQLite backend.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

use super::CacheStorage;
use super::connection::CacheDb;
use super::hash::compute_cache_key;
use crate::Error;
use crate::http::{Request, Response};

/// Insert the store row if it is missing. Runs inside a `call` closure.
fn ensure_store(conn: &rusqlite::Connection, name: &str, now: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO cache_stores (name, created_at) VALUES (?1, ?2)",
        params![name, now],
    )?;
    Ok(())
}

#[async_trait]
impl CacheStorage for CacheDb {
    async fn open(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> { ensure_store(conn, &name, &now) })
            .await
            .map_err(Error::from)
    }

    async fn get(&self, name: &str, request: &Request) -> Result<Option<Response>, Error> {
        let name = name.to_string();
        let key_hash = compute_cache_key(&request.method, &request.url);
        let row = self
            .conn
            .call(move |conn| -> Result<Option<(u16, String, Vec<u8>, Option<String>)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT status, headers_json, body, final_url
                     FROM cache_entries WHERE store = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![name, key_hash], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                });

                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((status, headers_json, body, final_url)) = row else {
            return Ok(None);
        };

        Ok(Some(Response {
            status,
            headers: serde_json::from_str(&headers_json)?,
            body: Bytes::from(body),
            url: final_url.and_then(|u| Url::parse(&u).ok()),
        }))
    }

    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<(), Error> {
        let name = name.to_string();
        let key_hash = compute_cache_key(&request.method, &request.url);
        let method = request.method.clone();
        let url = request.url.to_string();
        let status = response.status;
        let headers_json = serde_json::to_string(&response.headers)?;
        let body = response.body.to_vec();
        let final_url = response.url.as_ref().map(Url::to_string);
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_store(&tx, &name, &now)?;
                tx.execute(
                    "INSERT INTO cache_entries (
                        store, key_hash, method, url, status, headers_json, body, final_url, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(store, key_hash) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        final_url = excluded.final_url,
                        stored_at = excluded.stored_at",
                    params![name, key_hash, method, url, status, headers_json, body, final_url, now],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM cache_stores WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_stores ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }
}

impl CacheDb {
    /// Number of entries held by the named store.
    pub async fn entry_count(&self, name: &str) -> Result<u64, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries WHERE store = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> Request {
        Request::parse_get(url).unwrap()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = request("https://example.com/index.html");
        let resp = Response::new(200, "<html></html>")
            .with_header("Content-Type", "text/html")
            .with_header("ETag", "\"abc\"");

        db.put("app-v1", &req, &resp).await.unwrap();

        let retrieved = db.get("app-v1", &req).await.unwrap().unwrap();
        assert_eq!(retrieved.status, 200);
        assert_eq!(retrieved.body, resp.body);
        assert_eq!(retrieved.headers, resp.headers);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open("app-v1").await.unwrap();
        let result = db.get("app-v1", &request("https://example.com/nope")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_same_key() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = request("https://example.com/data.json");

        db.put("app-v1", &req, &Response::new(200, "old")).await.unwrap();
        db.put("app-v1", &req, &Response::new(200, "new")).await.unwrap();

        let hit = db.get("app-v1", &req).await.unwrap().unwrap();
        assert_eq!(hit.body.as_ref(), b"new");
        assert_eq!(db.entry_count("app-v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_generations_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = request("https://example.com/app.js");

        db.put("app-v1", &req, &Response::new(200, "v1")).await.unwrap();
        assert!(db.get("app-v2", &req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_cascades_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = request("https://example.com/app.js");
        db.put("app-v1", &req, &Response::new(200, "v1")).await.unwrap();

        assert!(db.delete("app-v1").await.unwrap());
        assert!(!db.delete("app-v1").await.unwrap());
        assert_eq!(db.entry_count("app-v1").await.unwrap(), 0);
        assert!(db.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keys_lists_opened_stores() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open("app-v1").await.unwrap();
        db.open("app-v2").await.unwrap();
        db.open("app-v1").await.unwrap();

        let keys = db.keys().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"app-v1".to_string()));
        assert!(keys.contains(&"app-v2".to_string()));
    }
}
