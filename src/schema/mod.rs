//! Schema management for the urban-scaling database.
//!
//! Brings a server from "no database" to the full city/block/service/tag
//! schema. Every step is safe to repeat. Steps commit independently, so a
//! failure part-way leaves the earlier steps in place.

pub mod ddl;

pub use ddl::{GeometryKind, TableSpec, TABLES};

use crate::config::ConnectionConfig;
use crate::db::{Dispatcher, GeometryMode};
use crate::error::{Result, UrbanDbError};
use tracing::info;

/// Optional steps on top of the default initialisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Also create the `road` table.
    pub roads: bool,
    /// Also create the `cluster` view.
    pub cluster_view: bool,
}

/// Issues schema DDL through a [`Dispatcher`].
pub struct SchemaManager<'a> {
    dispatcher: &'a dyn Dispatcher,
    config: &'a ConnectionConfig,
}

impl<'a> SchemaManager<'a> {
    /// `config` must name the target database.
    pub fn new(dispatcher: &'a dyn Dispatcher, config: &'a ConnectionConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Creates the database, PostGIS, and the city, block, service, tag and
    /// servicetag tables, in that order.
    ///
    /// The road table and the cluster view are not part of this sequence;
    /// see [`initialize_with`](Self::initialize_with).
    pub async fn initialize(&self) -> Result<()> {
        self.initialize_with(InitOptions::default()).await
    }

    pub async fn initialize_with(&self, options: InitOptions) -> Result<()> {
        info!("Initializing schema in {}", self.config.display_string());

        self.create_database().await?;
        self.create_city_table().await?;
        self.create_block_table().await?;
        self.create_service_table().await?;
        self.create_tag_table().await?;
        self.create_servicetag_table().await?;

        if options.roads {
            self.create_road_table().await?;
        }
        if options.cluster_view {
            self.create_cluster_view().await?;
        }

        info!("Schema ready");
        Ok(())
    }

    /// Creates the target database if missing, then enables PostGIS in it.
    ///
    /// The existence check and `CREATE DATABASE` run against the
    /// administrative database, since the target may not exist yet.
    pub async fn create_database(&self) -> Result<()> {
        let dbname = self.target_dbname()?;
        let admin = self.config.admin();

        let exists = self
            .dispatcher
            .execute_query(&admin, &ddl::database_exists(dbname)?, GeometryMode::Tabular)
            .await?;

        if exists.row_count() > 0 {
            info!("Database {dbname} already exists");
        } else {
            info!("Creating database {dbname}");
            let create = ddl::create_database(dbname)?;
            self.dispatcher
                .execute_mutation(&admin, &[create.as_str()])
                .await?;
        }

        self.mutate(&[ddl::CREATE_EXTENSION]).await
    }

    pub async fn create_city_table(&self) -> Result<()> {
        self.create_table(&ddl::CITY).await
    }

    /// Not part of [`initialize`](Self::initialize).
    pub async fn create_road_table(&self) -> Result<()> {
        self.create_table(&ddl::ROAD).await
    }

    pub async fn create_block_table(&self) -> Result<()> {
        self.create_table(&ddl::BLOCK).await
    }

    pub async fn create_service_table(&self) -> Result<()> {
        self.create_table(&ddl::SERVICE).await
    }

    pub async fn create_tag_table(&self) -> Result<()> {
        self.create_table(&ddl::TAG).await
    }

    /// Creates servicetag, then adds tag's back-reference to it.
    ///
    /// Both statements go out as one auto-commit sequence. If the second
    /// fails, servicetag stays and tag has no `fk_servicetag`.
    pub async fn create_servicetag_table(&self) -> Result<()> {
        info!("Creating table servicetag");
        self.mutate(&[ddl::SERVICETAG.create, ddl::LINK_TAG_TO_SERVICETAG])
            .await
    }

    /// Creates or replaces the `cluster` view over blocks.
    pub async fn create_cluster_view(&self) -> Result<()> {
        info!("Creating view cluster");
        self.mutate(&[ddl::CREATE_CLUSTER_VIEW]).await
    }

    async fn create_table(&self, table: &TableSpec) -> Result<()> {
        info!("Creating table {}", table.name);
        self.mutate(&[table.create]).await
    }

    async fn mutate(&self, statements: &[&str]) -> Result<()> {
        self.dispatcher
            .execute_mutation(self.config, statements)
            .await
    }

    fn target_dbname(&self) -> Result<&str> {
        self.config.dbname.as_deref().ok_or_else(|| {
            UrbanDbError::config("Schema initialization requires a target database name")
        })
    }
}
