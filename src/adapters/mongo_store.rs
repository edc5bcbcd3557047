//! Route store backed by a MongoDB collection.
//!
//! Documents use a string `_id` as the route id. Older documents may carry an
//! ObjectId `_id` or keep the id in a separate `id` field; both are still read
//! and can still be deleted.
use std::{future::Future, time::Duration};

use async_trait::async_trait;
use mongodb::{
    Client, Collection,
    bson::{Bson, doc, oid::ObjectId},
    options::{ClientOptions, Credential},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::models::{MongoDbConfig, RouteDefinition},
    ports::route_store::{RouteStore, StoreError, StoreResult},
};

/// On-disk document shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct StoredRoute {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    key: Option<Bson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    path: String,
    #[serde(default)]
    methods: Vec<String>,
    upstream: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    strip_prefix: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    plugins: Vec<String>,
}

impl StoredRoute {
    fn from_route(route: &RouteDefinition, id: &str) -> Self {
        Self {
            key: Some(Bson::String(id.to_string())),
            id: None,
            path: route.path.clone(),
            methods: route.methods.clone(),
            upstream: route.upstream.clone(),
            strip_prefix: route.strip_prefix,
            plugins: route.plugins.clone(),
        }
    }

    fn into_route(self) -> RouteDefinition {
        let id = match self.key {
            Some(Bson::String(s)) if !s.is_empty() => Some(s),
            Some(Bson::ObjectId(oid)) => Some(oid.to_hex()),
            _ => None,
        }
        .or(self.id);

        RouteDefinition {
            id,
            path: self.path,
            methods: self.methods,
            upstream: self.upstream,
            strip_prefix: self.strip_prefix,
            plugins: self.plugins,
        }
    }
}

pub struct MongoRouteStore {
    collection: Collection<StoredRoute>,
    timeout: Duration,
}

impl MongoRouteStore {
    /// Connect, authenticate when credentials are configured, and ping.
    pub async fn connect(config: &MongoDbConfig) -> StoreResult<Self> {
        let timeout = config
            .timeout()
            .map_err(|e| StoreError::Backend(format!("invalid timeout: {e}")))?;
        let connect_timeout = timeout * 2;

        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| StoreError::Backend(format!("invalid uri: {e}")))?;
        options.connect_timeout = Some(connect_timeout);
        options.server_selection_timeout = Some(connect_timeout);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            if !username.is_empty() && !password.is_empty() {
                let mut credential = Credential::default();
                credential.username = Some(username.clone());
                credential.password = Some(password.clone());
                options.credential = Some(credential);
            }
        }

        let client = Client::with_options(options)
            .map_err(|e| StoreError::Backend(format!("client setup: {e}")))?;
        let database = client.database(&config.database);

        let ping = async { database.run_command(doc! { "ping": 1 }).await };
        match tokio::time::timeout(connect_timeout, ping).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(StoreError::Backend(format!("ping: {e}"))),
            Err(_) => return Err(StoreError::Timeout(connect_timeout)),
        }

        tracing::info!(
            database = %config.database,
            collection = %config.collection,
            "Connected to MongoDB route store"
        );

        Ok(Self {
            collection: database.collection(&config.collection),
            timeout,
        })
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = mongodb::error::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Backend(format!("{op}: {e}"))),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl RouteStore for MongoRouteStore {
    async fn load_routes(&self) -> StoreResult<Vec<RouteDefinition>> {
        self.bounded("find", async {
            let mut cursor = self.collection.find(doc! {}).await?;
            let mut routes = Vec::new();
            while cursor.advance().await? {
                match cursor.deserialize_current() {
                    Ok(stored) => routes.push(stored.into_route()),
                    Err(e) => tracing::warn!(error = %e, "Skipping undecodable route document"),
                }
            }
            Ok(routes)
        })
        .await
    }

    async fn save_route(&self, route: &mut RouteDefinition) -> StoreResult<String> {
        let id = match route.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        let stored = StoredRoute::from_route(route, &id);
        self.bounded("insert", async { self.collection.insert_one(&stored).await })
            .await?;
        route.id = Some(id.clone());
        Ok(id)
    }

    async fn delete_route(&self, id: &str) -> StoreResult<()> {
        let id = id.trim();
        let mut filters = vec![doc! { "_id": id }, doc! { "id": id }];
        if let Ok(oid) = ObjectId::parse_str(id) {
            filters.push(doc! { "_id": oid });
        }

        for filter in filters {
            let result = self
                .bounded("delete", async { self.collection.delete_one(filter).await })
                .await?;
            if result.deleted_count > 0 {
                return Ok(());
            }
        }
        Err(StoreError::NotFound(id.to_string()))
    }
}
