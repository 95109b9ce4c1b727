//! [`EtcdStore`] backed by `etcd-client` over (optionally mutual) TLS.

use etcd_client::{Certificate, Client, ConnectOptions, Identity, SnapshotStreaming, TlsOptions};
use std::time::Duration;
use tracing::debug;

use super::{EtcdStore, MemberInfo, MemberStatus, SnapshotStream, StoreFactory};
use crate::config::EtcdConfig;
use crate::utils::{Result, RollbackError};

/// PEM material for the client side of a mutual TLS connection.
#[derive(Clone)]
struct TlsMaterial {
    ca: Vec<u8>,
    cert: Vec<u8>,
    key: Vec<u8>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial").finish_non_exhaustive()
    }
}

/// Creates [`EtcdClient`]s from the etcd section of the configuration.
#[derive(Debug, Clone)]
pub struct EtcdClientFactory {
    endpoints: Vec<String>,
    dial_timeout: Duration,
    tls: Option<TlsMaterial>,
}

impl EtcdClientFactory {
    /// Load TLS material (if configured) once; it is reused for every connection.
    pub async fn from_config(config: &EtcdConfig) -> Result<Self> {
        let tls = match (&config.ca_file, &config.cert_file, &config.key_file) {
            (Some(ca), Some(cert), Some(key)) => Some(TlsMaterial {
                ca: tokio::fs::read(ca).await?,
                cert: tokio::fs::read(cert).await?,
                key: tokio::fs::read(key).await?,
            }),
            (None, None, None) => None,
            _ => {
                return Err(RollbackError::Config(
                    "etcd TLS needs all of ca_file, cert_file and key_file".into(),
                ))
            }
        };

        Ok(Self {
            endpoints: config.endpoints.clone(),
            dial_timeout: Duration::from_secs(config.dial_timeout_secs),
            tls,
        })
    }

    fn options(&self) -> ConnectOptions {
        let options = ConnectOptions::new().with_connect_timeout(self.dial_timeout);
        match &self.tls {
            Some(tls) => options.with_tls(
                TlsOptions::new()
                    .ca_certificate(Certificate::from_pem(&tls.ca))
                    .identity(Identity::from_pem(&tls.cert, &tls.key)),
            ),
            None => options,
        }
    }

    async fn connect_to(&self, endpoints: &[String]) -> Result<EtcdClient> {
        debug!(?endpoints, "Connecting to etcd");
        let client = Client::connect(endpoints, Some(self.options())).await?;
        Ok(EtcdClient {
            client,
            factory: self.clone(),
        })
    }
}

impl StoreFactory for EtcdClientFactory {
    type Store = EtcdClient;

    async fn connect(&self) -> Result<EtcdClient> {
        self.connect_to(&self.endpoints).await
    }
}

/// A connected etcd client.
pub struct EtcdClient {
    client: Client,
    factory: EtcdClientFactory,
}

impl EtcdStore for EtcdClient {
    type Snapshot = SnapshotStreaming;

    async fn member_list(&mut self) -> Result<Vec<MemberInfo>> {
        let resp = self.client.member_list().await?;
        Ok(resp
            .members()
            .iter()
            .map(|m| MemberInfo {
                id: m.id(),
                name: m.name().to_string(),
                client_urls: m.client_urls().to_vec(),
            })
            .collect())
    }

    async fn status(&mut self, endpoint: &str) -> Result<MemberStatus> {
        // The status RPC answers for whichever endpoint serves the call, so
        // pin a dedicated connection to the member being asked.
        let mut member = self.factory.connect_to(&[endpoint.to_string()]).await?;
        let resp = member.client.status().await?;
        let member_id = resp
            .header()
            .map(|h| h.member_id())
            .ok_or_else(|| RollbackError::LeadershipUnknown(endpoint.to_string()))?;
        Ok(MemberStatus {
            member_id,
            leader: resp.leader(),
        })
    }

    async fn get(&mut self, key: &str) -> Result<Vec<Vec<u8>>> {
        let resp = self.client.get(key, None).await?;
        Ok(resp.kvs().iter().map(|kv| kv.value().to_vec()).collect())
    }

    async fn snapshot(&mut self) -> Result<SnapshotStreaming> {
        Ok(self.client.snapshot().await?)
    }
}

impl SnapshotStream for SnapshotStreaming {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let message = self.message().await?;
        Ok(message.map(|resp| resp.blob().to_vec()))
    }
}
