use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use annolog_core::{Collection, EntityId};

use crate::error::StoreError;
use crate::rest::{Method, RestRequest, RestResponse, Transport};

/// One request as the backend saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub status: u16,
}

/// In-process REST backend: answers `/{collection}/{id}` requests from a
/// SQLite table, assigning ids the way the real server does.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    versioned: BTreeSet<Collection>,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self::from_conn(conn))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self::from_conn(conn))
    }

    fn from_conn(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            versioned: BTreeSet::new(),
        }
    }

    /// Updates to this collection answer with the full resource as `object`.
    pub fn with_versioned(mut self, collection: impl Into<Collection>) -> Self {
        self.versioned.insert(collection.into().singular());
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("connection lock poisoned".into()))
    }

    pub fn schema_version(&self) -> Result<i32, StoreError> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })?)
    }

    /// Seed an entity under a chosen id, bypassing the request log. Replaces
    /// an existing entity with the same id in the same collection only.
    pub fn put(
        &self,
        collection: impl Into<Collection>,
        id: EntityId,
        body: Value,
    ) -> Result<(), StoreError> {
        let collection = collection.into().singular();
        let mut fields = into_object(body)?;
        fields.remove("id");
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO entities (collection, id, body) VALUES (?1, ?2, ?3)",
            params![collection.as_str(), id.get(), Value::Object(fields).to_string()],
        )?;
        conn.execute(
            "INSERT INTO id_sequences (collection, last_id) VALUES (?1, ?2)
             ON CONFLICT (collection) DO UPDATE SET last_id = MAX(last_id, excluded.last_id)",
            params![collection.as_str(), id.get()],
        )?;
        Ok(())
    }

    /// Read an entity directly, bypassing the request log.
    pub fn entity(
        &self,
        collection: impl Into<Collection>,
        id: EntityId,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        let conn = self.conn()?;
        read_entity(&conn, &collection.into().singular(), id)
    }

    pub fn ids(&self, collection: impl Into<Collection>) -> Result<Vec<EntityId>, StoreError> {
        let collection = collection.into().singular();
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM entities WHERE collection = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![collection.as_str()], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(EntityId::new).collect())
    }

    pub fn count(&self, collection: impl Into<Collection>) -> Result<usize, StoreError> {
        Ok(self.ids(collection)?.len())
    }

    pub fn requests(&self) -> Result<Vec<LoggedRequest>, StoreError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT method, path, body, status FROM request_log ORDER BY seq")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, u16>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(method, path, body, status)| -> Result<LoggedRequest, StoreError> {
                Ok(LoggedRequest {
                    method: Method::parse(&method)?,
                    path,
                    body: body.map(|b| serde_json::from_str(&b)).transpose()?,
                    status,
                })
            })
            .collect()
    }

    /// Requests with a mutating verb, in arrival order.
    pub fn mutations(&self) -> Result<Vec<LoggedRequest>, StoreError> {
        Ok(self
            .requests()?
            .into_iter()
            .filter(|r| r.method != Method::Get)
            .collect())
    }

    fn handle(&self, request: &RestRequest) -> Result<RestResponse, StoreError> {
        let conn = self.conn()?;
        let response = self.route(&conn, request)?;
        conn.execute(
            "INSERT INTO request_log (method, path, body, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                request.method.as_str(),
                request.path,
                request.body.as_ref().map(Value::to_string),
                response.status,
            ],
        )?;
        if response.is_success() {
            debug!(method = %request.method, path = %request.path, status = response.status, "handled");
        } else {
            warn!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                message = response.message().unwrap_or_default(),
                "rejected"
            );
        }
        Ok(response)
    }

    fn route(&self, conn: &Connection, request: &RestRequest) -> Result<RestResponse, StoreError> {
        let segments: Vec<&str> = request
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match (request.method, segments.as_slice()) {
            (Method::Post, [collection]) | (Method::Post, [collection, _]) => {
                self.create(conn, &Collection::from(*collection), request.body.as_ref())
            }
            (method, [collection, id]) => {
                let Ok(id) = id.parse::<i64>() else {
                    return Ok(reject(400, format!("invalid id: {id}")));
                };
                let collection = Collection::from(*collection).singular();
                let id = EntityId::new(id);
                match method {
                    Method::Get => match read_entity(conn, &collection, id)? {
                        Some(fields) => Ok(RestResponse::new(200, Value::Object(fields))),
                        None => Ok(reject(404, format!("{collection} {id} not found"))),
                    },
                    Method::Patch => self.patch(conn, &collection, id, request.body.as_ref()),
                    Method::Delete => remove(conn, &collection, id),
                    Method::Post => Ok(reject(405, "POST goes to the collection")),
                }
            }
            _ => Ok(reject(
                404,
                format!("no route for {} {}", request.method, request.path),
            )),
        }
    }

    fn create(
        &self,
        conn: &Connection,
        collection: &Collection,
        body: Option<&Value>,
    ) -> Result<RestResponse, StoreError> {
        let Some(Value::Array(items)) = body else {
            return Ok(reject(400, "create body must be a list"));
        };
        let mut objects = Vec::with_capacity(items.len());
        for item in items {
            let Value::Object(fields) = item else {
                return Ok(reject(400, "create body must be a list of objects"));
            };
            objects.push(fields.clone());
        }

        let collection = collection.singular();
        let stamp = now_stamp(conn)?;
        let mut ids = Vec::with_capacity(objects.len());
        for mut fields in objects {
            fields.remove("id");
            fields.insert("created_datetime".into(), stamp.clone().into());
            fields.insert("modified_datetime".into(), stamp.clone().into());
            let id = next_id(conn, &collection)?;
            conn.execute(
                "INSERT INTO entities (collection, id, body) VALUES (?1, ?2, ?3)",
                params![collection.as_str(), id, Value::Object(fields).to_string()],
            )?;
            ids.push(id);
        }

        Ok(RestResponse::new(
            201,
            json!({
                "message": format!("{} {} created successfully!", ids.len(), collection),
                "id": ids,
            }),
        ))
    }

    fn patch(
        &self,
        conn: &Connection,
        collection: &Collection,
        id: EntityId,
        body: Option<&Value>,
    ) -> Result<RestResponse, StoreError> {
        let Some(Value::Object(patch)) = body else {
            return Ok(reject(400, "update body must be an object"));
        };
        let Some(mut current) = read_entity(conn, collection, id)? else {
            return Ok(reject(404, format!("{collection} {id} not found")));
        };

        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            // attributes merge per key; everything else replaces
            if key == "attributes"
                && let Some(Value::Object(existing)) = current.get_mut("attributes")
                && let Value::Object(incoming) = value
            {
                for (k, v) in incoming {
                    existing.insert(k.clone(), v.clone());
                }
                continue;
            }
            current.insert(key.clone(), value.clone());
        }
        current.insert("modified_datetime".into(), now_stamp(conn)?.into());
        current.remove("id");

        conn.execute(
            "UPDATE entities SET body = ?1 WHERE id = ?2 AND collection = ?3",
            params![Value::Object(current.clone()).to_string(), id.get(), collection.as_str()],
        )?;

        let mut response = json!({ "message": format!("{collection} {id} successfully updated!") });
        if self.versioned.contains(collection) {
            current.insert("id".into(), id.get().into());
            response["object"] = Value::Object(current);
        }
        Ok(RestResponse::new(200, response))
    }
}

#[async_trait]
impl Transport for SqliteBackend {
    async fn send(&self, request: RestRequest) -> Result<RestResponse, StoreError> {
        self.handle(&request)
    }
}

fn remove(conn: &Connection, collection: &Collection, id: EntityId) -> Result<RestResponse, StoreError> {
    let n = conn.execute(
        "DELETE FROM entities WHERE id = ?1 AND collection = ?2",
        params![id.get(), collection.as_str()],
    )?;
    if n == 0 {
        return Ok(reject(404, format!("{collection} {id} not found")));
    }
    Ok(RestResponse::new(
        200,
        json!({ "message": format!("{collection} {id} successfully deleted!") }),
    ))
}

fn next_id(conn: &Connection, collection: &Collection) -> Result<i64, StoreError> {
    Ok(conn.query_row(
        "INSERT INTO id_sequences (collection, last_id) VALUES (?1, 1)
         ON CONFLICT (collection) DO UPDATE SET last_id = last_id + 1
         RETURNING last_id",
        params![collection.as_str()],
        |row| row.get(0),
    )?)
}

fn read_entity(
    conn: &Connection,
    collection: &Collection,
    id: EntityId,
) -> Result<Option<Map<String, Value>>, StoreError> {
    let text: Option<String> = conn
        .query_row(
            "SELECT body FROM entities WHERE id = ?1 AND collection = ?2",
            params![id.get(), collection.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    let Some(text) = text else {
        return Ok(None);
    };
    let mut fields = into_object(serde_json::from_str(&text)?)?;
    fields.insert("id".into(), id.get().into());
    Ok(Some(fields))
}

fn now_stamp(conn: &Connection) -> Result<String, StoreError> {
    Ok(conn.query_row("SELECT strftime('%Y-%m-%dT%H:%M:%fZ', 'now')", [], |row| {
        row.get(0)
    })?)
}

fn into_object(value: Value) -> Result<Map<String, Value>, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "entity body must be an object, got {other}"
        ))),
    }
}

fn reject(status: u16, message: impl Into<String>) -> RestResponse {
    RestResponse::new(status, json!({ "message": message.into() }))
}
