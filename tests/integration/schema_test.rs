//! Schema integration tests.
//!
//! Tests idempotent creation and referential integrity of the schema.

use super::{get_initialized_config, insert_city, scalar, unique_name};
use urbandb::db::{Dispatcher, GeometryMode, PostgresDispatcher};
use urbandb::error::UrbanDbError;
use urbandb::schema::{SchemaManager, TABLES};

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let Some(config) = get_initialized_config().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let column_count = "SELECT COUNT(*) FROM information_schema.columns \
                        WHERE table_schema = 'public' AND table_name = 'tag'";
    let before = scalar(&config, column_count).await;

    let dispatcher = PostgresDispatcher::new();
    let manager = SchemaManager::new(&dispatcher, &config);
    manager.initialize().await.unwrap();
    manager.initialize().await.unwrap();

    assert_eq!(scalar(&config, column_count).await, before);
    assert_eq!(
        scalar(
            &config,
            "SELECT COUNT(*) FROM pg_constraint WHERE conname = 'fk_servicetag'"
        )
        .await,
        1
    );
}

#[tokio::test]
async fn test_all_tables_exist() {
    let Some(config) = get_initialized_config().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    for table in TABLES {
        let count = scalar(
            &config,
            &format!(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_name = '{}'",
                table.name
            ),
        )
        .await;
        assert_eq!(count, 1, "Expected table '{}' to exist", table.name);
    }
}

#[tokio::test]
async fn test_geometry_columns_registered_with_srid() {
    let Some(config) = get_initialized_config().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    for table in TABLES.iter().filter(|t| t.geometry.is_some()) {
        let srid = scalar(
            &config,
            &format!(
                "SELECT srid FROM geometry_columns WHERE f_table_name = '{}'",
                table.name
            ),
        )
        .await;
        assert_eq!(srid, 4326, "Unexpected SRID on {}", table.name);
    }
}

#[tokio::test]
async fn test_city_delete_cascades_to_block() {
    let Some(config) = get_initialized_config().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let dispatcher = PostgresDispatcher::new();

    let city_id = insert_city(&config, &unique_name("cascade-block")).await;
    let insert_block = format!(
        "INSERT INTO block (city_id, cluster_id, population, area, geometry) VALUES \
         ({city_id}, 1, 10, 0.25, \
         ST_GeomFromText('POLYGON((0 0, 0.5 0, 0.5 0.5, 0 0.5, 0 0))', 4326))"
    );
    dispatcher
        .execute_mutation(&config, &[insert_block.as_str()])
        .await
        .unwrap();

    let blocks = format!("SELECT COUNT(*) FROM block WHERE city_id = {city_id}");
    assert_eq!(scalar(&config, &blocks).await, 1);

    let delete = format!("DELETE FROM city WHERE city_id = {city_id}");
    dispatcher
        .execute_mutation(&config, &[delete.as_str()])
        .await
        .unwrap();

    assert_eq!(scalar(&config, &blocks).await, 0);
}

#[tokio::test]
async fn test_city_delete_cascades_to_service_road_and_servicetag() {
    let Some(config) = get_initialized_config().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let dispatcher = PostgresDispatcher::new();

    let city_id = insert_city(&config, &unique_name("cascade-service")).await;
    let tag_name = unique_name("cascade-tag");
    let inserts = [
        format!(
            "INSERT INTO service (city_id, name, geometry) VALUES \
             ({city_id}, 'library', ST_SetSRID(ST_MakePoint(0.5, 0.5), 4326))"
        ),
        format!(
            "INSERT INTO road (city_id, geometry) VALUES \
             ({city_id}, ST_GeomFromText('LINESTRING(0 0, 1 1)', 4326))"
        ),
        format!("INSERT INTO tag (name, category) VALUES ('{tag_name}', 'culture')"),
        format!(
            "INSERT INTO servicetag (service_id, tag_id) \
             SELECT s.service_id, t.tag_id FROM service s, tag t \
             WHERE s.city_id = {city_id} AND t.name = '{tag_name}'"
        ),
    ];
    let inserts: Vec<&str> = inserts.iter().map(String::as_str).collect();
    dispatcher.execute_mutation(&config, &inserts).await.unwrap();

    let links = format!(
        "SELECT COUNT(*) FROM servicetag st JOIN tag t ON t.tag_id = st.tag_id \
         WHERE t.name = '{tag_name}'"
    );
    assert_eq!(scalar(&config, &links).await, 1);

    let delete = format!("DELETE FROM city WHERE city_id = {city_id}");
    dispatcher
        .execute_mutation(&config, &[delete.as_str()])
        .await
        .unwrap();

    for table in ["service", "road"] {
        let count = format!("SELECT COUNT(*) FROM {table} WHERE city_id = {city_id}");
        assert_eq!(scalar(&config, &count).await, 0, "{table} rows left behind");
    }
    assert_eq!(scalar(&config, &links).await, 0);

    // The tag itself survives
    let tags = format!("SELECT COUNT(*) FROM tag WHERE name = '{tag_name}'");
    assert_eq!(scalar(&config, &tags).await, 1);

    let delete_tag = format!("DELETE FROM tag WHERE name = '{tag_name}'");
    dispatcher
        .execute_mutation(&config, &[delete_tag.as_str()])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_tag_delete_does_not_cascade() {
    let Some(config) = get_initialized_config().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let dispatcher = PostgresDispatcher::new();

    let city_id = insert_city(&config, &unique_name("tag-delete")).await;
    let tag_name = unique_name("referenced-tag");
    let inserts = [
        format!(
            "INSERT INTO service (city_id, name, geometry) VALUES \
             ({city_id}, 'clinic', ST_SetSRID(ST_MakePoint(0.1, 0.1), 4326))"
        ),
        format!("INSERT INTO tag (name, category) VALUES ('{tag_name}', 'health')"),
        format!(
            "INSERT INTO servicetag (service_id, tag_id) \
             SELECT s.service_id, t.tag_id FROM service s, tag t \
             WHERE s.city_id = {city_id} AND t.name = '{tag_name}'"
        ),
    ];
    let inserts: Vec<&str> = inserts.iter().map(String::as_str).collect();
    dispatcher.execute_mutation(&config, &inserts).await.unwrap();

    let delete_tag = format!("DELETE FROM tag WHERE name = '{tag_name}'");
    let err = dispatcher
        .execute_mutation(&config, &[delete_tag.as_str()])
        .await
        .unwrap_err();
    assert!(matches!(err, UrbanDbError::Mutation { index: 0, .. }));
    assert!(err.to_string().contains("fk_tag"), "got {err}");

    let links = format!(
        "SELECT COUNT(*) FROM servicetag st JOIN service s ON s.service_id = st.service_id \
         WHERE s.city_id = {city_id}"
    );
    assert_eq!(scalar(&config, &links).await, 1);

    let cleanup = [
        format!("DELETE FROM city WHERE city_id = {city_id}"),
        delete_tag,
    ];
    let cleanup: Vec<&str> = cleanup.iter().map(String::as_str).collect();
    dispatcher.execute_mutation(&config, &cleanup).await.unwrap();
}

#[tokio::test]
async fn test_cluster_view_aggregates_blocks() {
    let Some(config) = get_initialized_config().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let dispatcher = PostgresDispatcher::new();

    let city_id = insert_city(&config, &unique_name("cluster")).await;
    let insert_blocks = format!(
        "INSERT INTO block (city_id, cluster_id, population, area, geometry) VALUES \
         ({city_id}, 7, 100, 1.0, ST_GeomFromText('POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))', 4326)), \
         ({city_id}, 7, 300, 1.0, ST_GeomFromText('POLYGON((1 0, 2 0, 2 1, 1 1, 1 0))', 4326)), \
         ({city_id}, NULL, 50, 1.0, ST_GeomFromText('POLYGON((5 5, 6 5, 6 6, 5 6, 5 5))', 4326))"
    );
    dispatcher
        .execute_mutation(&config, &[insert_blocks.as_str()])
        .await
        .unwrap();

    let output = dispatcher
        .execute_query(
            &config,
            &format!(
                "SELECT cluster_id, block_count, population, density, geometry \
                 FROM cluster WHERE city_id = {city_id}"
            ),
            GeometryMode::Detect,
        )
        .await
        .unwrap();

    let clusters = output.into_spatial().expect("spatial result");
    assert_eq!(clusters.row_count(), 1);
    assert_eq!(clusters.get(0, "block_count").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(clusters.get(0, "population").and_then(|v| v.as_i64()), Some(400));
    assert!((clusters.total_area() - 2.0).abs() < 1e-9);

    let delete = format!("DELETE FROM city WHERE city_id = {city_id}");
    dispatcher
        .execute_mutation(&config, &[delete.as_str()])
        .await
        .unwrap();
}
