//! Tests against a real MySQL.
//!
//! Run with `--features test-mysql`. Uses `MYSQL_URL` when set, otherwise
//! starts a container per test (requires docker). Every test drops the
//! tables of the selected database and one test changes the global
//! `sql_mode`, so with `MYSQL_URL` pass `--test-threads=1` and connect as a
//! user allowed to `SET GLOBAL`.

#![cfg(feature = "test-mysql")]

use std::sync::Arc;

use facet::Facet;
use tabby::{
    BlobStore, Dialect, Encoding, Executor, FieldKind, FieldSpec, HashAlgorithm, NameRegistry,
    SchemaNode, SchemaWalker,
};
use testcontainers_modules::mysql::Mysql;
use testcontainers_modules::testcontainers::ContainerAsync;
use testcontainers_modules::testcontainers::runners::AsyncRunner;

struct Database {
    url: String,
    _container: Option<ContainerAsync<Mysql>>,
}

async fn database() -> Database {
    if let Ok(url) = std::env::var("MYSQL_URL") {
        return Database {
            url,
            _container: None,
        };
    }
    let container = Mysql::default()
        .start()
        .await
        .expect("failed to start mysql container");
    let port = container
        .get_host_port_ipv4(3306)
        .await
        .expect("failed to get mysql port");
    Database {
        url: format!("mysql://root@127.0.0.1:{port}/test"),
        _container: Some(container),
    }
}

/// Drop whatever earlier runs left in the selected database.
async fn reset(exec: &dyn Executor) {
    let rows = exec
        .query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'",
        )
        .await
        .unwrap();
    let tables: Vec<String> = rows
        .iter()
        .map(|row| Dialect::Mysql.quote_ident(row.text(0usize).unwrap()))
        .collect();
    if !tables.is_empty() {
        // One statement, so foreign keys between the dropped tables are fine.
        exec.execute(&format!("DROP TABLE {}", tables.join(", ")))
            .await
            .unwrap();
    }
}

fn schema() -> SchemaNode {
    let item = SchemaNode::new("inv.Item")
        .field(FieldSpec::string("sku", 1).max_length(40))
        .field(FieldSpec::int32("count", 2));
    SchemaNode::new("inv.Shelf")
        .field(FieldSpec::string("label", 1).with_default("it's \\ unlabelled"))
        .field(FieldSpec::repeated("items", 2, FieldKind::Message(item)))
        .field(FieldSpec::repeated("notes", 3, FieldKind::String))
}

#[tokio::test]
async fn test_sync_against_mysql() {
    let db = database().await;
    let exec = tabby::connect(&db.url).await.unwrap();
    reset(&exec).await;

    let registry = Arc::new(NameRegistry::new(HashAlgorithm::default()).unwrap());
    let mut walker = SchemaWalker::connect(&exec, Arc::clone(&registry))
        .await
        .unwrap();
    let created = walker.synchronize(&schema()).await.unwrap();
    assert_eq!(created.tables_created, 3);
    assert_eq!(created.columns_added, 4);

    let restarted = Arc::new(NameRegistry::new(HashAlgorithm::default()).unwrap());
    let mut walker = SchemaWalker::connect(&exec, restarted).await.unwrap();
    let again = walker.synchronize(&schema()).await.unwrap();
    assert!(again.is_noop());
    assert_eq!(again.tables, created.tables);

    let shelf = &created.tables[0];
    let items = &created.tables[1];
    let shelf_id = exec
        .insert_returning_id(&format!("INSERT INTO `{}` () VALUES ()", shelf.name), "__id__")
        .await
        .unwrap();
    assert!(shelf_id > 0);
    for index in 0..2 {
        exec.execute(&format!(
            "INSERT INTO `{}` (`__parent_id__`, `__index__`) VALUES ({shelf_id}, {index})",
            items.name
        ))
        .await
        .unwrap();
    }
    let rows = exec
        .query(&format!("SELECT `{}` FROM `{}`", shelf.columns[0].name, shelf.name))
        .await
        .unwrap();
    assert_eq!(rows[0].text(0usize), Some("it's \\ unlabelled"));

    let duplicate = exec
        .execute(&format!(
            "INSERT INTO `{}` (`__parent_id__`, `__index__`) VALUES ({shelf_id}, 0)",
            items.name
        ))
        .await
        .unwrap_err();
    assert!(tabby::is_unique_violation(&duplicate), "{duplicate}");
}

#[tokio::test]
async fn test_backslash_escapes_stay_enabled() {
    let db = database().await;
    let exec = tabby::connect(&db.url).await.unwrap();
    reset(&exec).await;

    exec.execute(
        "SET GLOBAL sql_mode = \
         CONCAT_WS(',', NULLIF(@@GLOBAL.sql_mode, ''), 'NO_BACKSLASH_ESCAPES')",
    )
    .await
    .unwrap();
    // New connections inherit the global mode; the pool must undo it.
    let fresh = tabby::connect(&db.url).await.unwrap();
    let rows = fresh.query("SELECT @@SESSION.sql_mode").await.unwrap();
    let mode = rows[0].text(0usize).unwrap_or_default().to_string();
    let hostile = "'); DROP TABLE t; -- \\";
    let echoed = fresh
        .query(&format!("SELECT {}", Dialect::Mysql.escape_string(hostile)))
        .await;
    exec.execute(
        "SET GLOBAL sql_mode = \
         TRIM(BOTH ',' FROM REPLACE(@@GLOBAL.sql_mode, 'NO_BACKSLASH_ESCAPES', ''))",
    )
    .await
    .unwrap();

    assert!(!mode.contains("NO_BACKSLASH_ESCAPES"), "{mode}");
    assert_eq!(echoed.unwrap()[0].text(0usize), Some(hostile));
}

#[tokio::test]
async fn test_concurrent_registries_agree() {
    let db = database().await;
    let exec = tabby::connect(&db.url).await.unwrap();
    reset(&exec).await;
    NameRegistry::new(HashAlgorithm::default())
        .unwrap()
        .init(&exec)
        .await
        .unwrap();

    let logical = format!("inv.{}.2:1", "Shelf".repeat(200));
    let exec = Arc::new(exec);
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let exec = Arc::clone(&exec);
        let logical = logical.clone();
        tasks.push(tokio::spawn(async move {
            let registry = Arc::new(NameRegistry::new(HashAlgorithm::default()).unwrap());
            let mut resolver = registry.resolver(&*exec);
            resolver.resolve(&logical).await.unwrap()
        }));
    }
    let mut shorts = Vec::new();
    for task in tasks {
        shorts.push(task.await.unwrap());
    }
    shorts.dedup();
    assert_eq!(shorts.len(), 1);

    let rows = exec
        .query("SELECT COUNT(*), MAX(CHAR_LENGTH(real_name)) FROM tabby_name_lookup")
        .await
        .unwrap();
    assert_eq!(rows[0].try_get::<i64>(0usize).unwrap(), 1);
    assert_eq!(
        rows[0].try_get::<i64>(1usize).unwrap(),
        logical.len() as i64
    );
}

#[derive(Debug, PartialEq, Facet)]
struct Snapshot {
    label: String,
    counts: Vec<i32>,
    comment: Option<String>,
}

#[tokio::test]
async fn test_blob_round_trip_against_mysql() {
    let db = database().await;
    let exec = tabby::connect(&db.url).await.unwrap();
    reset(&exec).await;

    let store = BlobStore::new(&exec);
    store.init().await.unwrap();

    let snapshot = Snapshot {
        label: "aisle 7, \"upper\" shelf, O'Neill's side \\ left".to_string(),
        counts: (0..40).collect(),
        comment: None,
    };
    let mut ids = Vec::new();
    for encoding in [Encoding::Json, Encoding::Binary] {
        let id = store.write_message(&snapshot, encoding).await.unwrap();
        let back: Snapshot = store.read_message(id).await.unwrap();
        assert_eq!(back, snapshot, "{encoding:?}");
        ids.push(id);
    }
    assert_ne!(ids[0], ids[1]);

    let violation = exec
        .execute("INSERT INTO tabby_message_blob (message_type) VALUES ('Snapshot')")
        .await;
    assert!(violation.is_err());
}
