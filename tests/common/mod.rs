use std::env;
use std::sync::Arc;

use diesel::pg::PgConnection;
use diesel::{Connection, RunQueryDsl};
use pushkind_images::db::{Database, PoolOptions};

/// Throwaway database created on the server behind `TEST_DATABASE_URL` and
/// dropped again when the value goes out of scope.
pub struct TestDb {
    admin_url: String,
    name: String,
    db: Arc<Database>,
}

impl TestDb {
    /// Returns `None` when `TEST_DATABASE_URL` is not set so callers can skip.
    pub fn new(embedding_dim: usize) -> Option<Self> {
        let Ok(admin_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("skipping PostgreSQL test since TEST_DATABASE_URL is not set");
            return None;
        };

        let name = format!("images_test_{}", rand::random::<u32>());
        let mut conn = PgConnection::establish(&admin_url).expect("connect to TEST_DATABASE_URL");
        diesel::sql_query(format!("CREATE DATABASE {name}"))
            .execute(&mut conn)
            .expect("create test database");

        let mut url = url::Url::parse(&admin_url).expect("valid TEST_DATABASE_URL");
        url.set_path(&name);

        let db = Arc::new(Database::new(
            url.as_str(),
            PoolOptions {
                min_idle: 1,
                max_size: 4,
            },
        ));
        db.connect().expect("connect to test database");
        db.create_schema(embedding_dim).expect("create schema");

        Some(Self {
            admin_url,
            name,
            db,
        })
    }

    pub fn database(&self) -> Arc<Database> {
        self.db.clone()
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        self.db.close();
        if let Ok(mut conn) = PgConnection::establish(&self.admin_url) {
            let _ = diesel::sql_query(format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", self.name))
                .execute(&mut conn);
        }
    }
}
