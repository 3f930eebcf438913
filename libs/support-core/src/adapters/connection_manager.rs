use crate::{
    CoreError,
    adapters::ssh_tunnel::{SshTunnel, TunnelKey},
    config::{self, ConnectSettings, DatabaseCredentials, Lookup, PrimarySecrets},
};
use sqlx::{
    MySqlPool,
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
};
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// A live database pool. Clones share the pool. Tunneled pools keep the
/// tunnel they run through.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: u64,
    pool: MySqlPool,
    tunnel: Option<Arc<SshTunnel>>,
}

impl ConnectionHandle {
    #[cfg(test)]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// False once the pool is closed or the SSH session under it dropped.
    pub fn is_usable(&self) -> bool {
        !self.pool.is_closed() && self.tunnel.as_ref().is_none_or(|t| t.is_alive())
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("tunneled", &self.tunnel.is_some())
            .finish()
    }
}

/// Session connection state. Each side is either live or absent; absent is
/// a valid state that every query treats as "no data".
#[derive(Clone, Debug, Default)]
pub struct Connections {
    pub primary: Option<ConnectionHandle>,
    pub auxiliary: Option<ConnectionHandle>,
}

/// Connections shared by every request.
///
/// When built by [`ConnectionManager::establish`], a configured side that
/// is absent or no longer usable is opened again on the next call to
/// [`SharedConnections::current`]. A failure leaves that side absent for the
/// current request only. When built from a plain [`Connections`], the
/// snapshot is served as is.
#[derive(Clone)]
pub struct SharedConnections {
    current: Arc<Mutex<Connections>>,
    reopen: Option<Reopen>,
}

#[derive(Clone)]
struct Reopen {
    manager: Arc<ConnectionManager>,
    primary: Option<PrimarySecrets>,
    auxiliary: Option<DatabaseCredentials>,
}

impl SharedConnections {
    fn reopening(
        manager: Arc<ConnectionManager>,
        primary: Option<PrimarySecrets>,
        auxiliary: Option<DatabaseCredentials>,
    ) -> Self {
        Self {
            current: Arc::new(Mutex::new(Connections::default())),
            reopen: Some(Reopen {
                manager,
                primary,
                auxiliary,
            }),
        }
    }

    pub async fn current(&self) -> Connections {
        let mut current = self.current.lock().await;
        if let Some(reopen) = &self.reopen {
            if let Some(secrets) = &reopen.primary {
                if !current.primary.as_ref().is_some_and(ConnectionHandle::is_usable) {
                    current.primary = match reopen.manager.open_primary(secrets).await {
                        Ok(handle) => Some(handle),
                        Err(e) => {
                            error!("Primary database unavailable (user queries disabled): {}", e);
                            None
                        }
                    };
                }
            }
            if let Some(credentials) = &reopen.auxiliary {
                if !current.auxiliary.as_ref().is_some_and(ConnectionHandle::is_usable) {
                    current.auxiliary = match reopen.manager.open_direct_connection(credentials).await {
                        Ok(handle) => Some(handle),
                        Err(e) => {
                            error!("Auxiliary database unavailable (access log disabled): {}", e);
                            None
                        }
                    };
                }
            }
        }
        current.clone()
    }
}

impl From<Connections> for SharedConnections {
    fn from(connections: Connections) -> Self {
        Self {
            current: Arc::new(Mutex::new(connections)),
            reopen: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Tunneled {
        tunnel: TunnelKey,
        host: String,
        port: u16,
        user: String,
        database: String,
    },
    Direct {
        host: String,
        port: u16,
        user: String,
        database: String,
    },
}

/// Owns every tunnel and pool opened by the process. Opens are idempotent
/// per argument set; `close` tears pools down before tunnels.
pub struct ConnectionManager {
    settings: ConnectSettings,
    tunnels: Mutex<HashMap<TunnelKey, Arc<SshTunnel>>>,
    pools: Mutex<HashMap<PoolKey, ConnectionHandle>>,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new(settings: ConnectSettings) -> Self {
        Self {
            settings,
            tunnels: Mutex::new(HashMap::new()),
            pools: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn open_tunnel(
        &self,
        host: &str,
        port: u16,
        user: &str,
        private_key_pem: &str,
        host_fingerprint: Option<String>,
    ) -> Result<Arc<SshTunnel>, CoreError> {
        let key = TunnelKey {
            host: host.to_string(),
            port,
            user: user.to_string(),
        };
        let mut tunnels = self.tunnels.lock().await;
        if let Some(existing) = tunnels.remove(&key) {
            if existing.is_alive() {
                tunnels.insert(key, Arc::clone(&existing));
                return Ok(existing);
            }
            warn!(host = %key.host, "SSH session dropped; reconnecting");
            existing.close().await;
        }

        let timeout = self.settings.timeout;
        let tunnel = with_retry(&self.settings, "ssh tunnel", || {
            SshTunnel::open(key.clone(), private_key_pem, host_fingerprint.clone(), timeout)
        })
        .await?;
        let tunnel = Arc::new(tunnel);
        tunnels.insert(key, Arc::clone(&tunnel));
        Ok(tunnel)
    }

    /// Pool to a database reachable only from the bastion.
    pub async fn open_db_connection(
        &self,
        tunnel: &Arc<SshTunnel>,
        credentials: &DatabaseCredentials,
    ) -> Result<ConnectionHandle, CoreError> {
        let key = PoolKey::Tunneled {
            tunnel: tunnel.key().clone(),
            host: credentials.host.clone(),
            port: credentials.port,
            user: credentials.user.clone(),
            database: credentials.database.clone(),
        };
        let mut pools = self.pools.lock().await;
        if let Some(existing) = reusable(&mut pools, &key).await {
            return Ok(existing);
        }

        let local = tunnel.forward(&credentials.host, credentials.port).await?;
        let options = connect_options(credentials, "127.0.0.1", local.port());
        let pool = with_retry(&self.settings, "tunneled database", || self.connect(options.clone())).await?;
        let handle = self.register(&mut pools, key, pool, Some(Arc::clone(tunnel)));
        info!(database = %credentials.database, "primary database connected through tunnel");
        Ok(handle)
    }

    pub async fn open_direct_connection(
        &self,
        credentials: &DatabaseCredentials,
    ) -> Result<ConnectionHandle, CoreError> {
        let key = PoolKey::Direct {
            host: credentials.host.clone(),
            port: credentials.port,
            user: credentials.user.clone(),
            database: credentials.database.clone(),
        };
        let mut pools = self.pools.lock().await;
        if let Some(existing) = reusable(&mut pools, &key).await {
            return Ok(existing);
        }

        let options = connect_options(credentials, &credentials.host, credentials.port);
        let pool = with_retry(&self.settings, "direct database", || self.connect(options.clone())).await?;
        let handle = self.register(&mut pools, key, pool, None);
        info!(host = %credentials.host, database = %credentials.database, "database connected directly");
        Ok(handle)
    }

    /// Reads the connection targets once and opens everything they
    /// describe. A side that is misconfigured stays absent for the life of
    /// the process; a side that fails to connect is retried by later
    /// requests.
    pub async fn establish(self: Arc<Self>, lookup: Lookup<'_>) -> SharedConnections {
        let primary = match PrimarySecrets::load(lookup) {
            Ok(secrets) => Some(secrets),
            Err(e) => {
                error!("Primary database misconfigured (user queries disabled): {}", e);
                None
            }
        };
        let auxiliary = match config::load_auxiliary(lookup) {
            Ok(Some(credentials)) => Some(credentials),
            Ok(None) => {
                warn!("AUX_SQL_HOSTNAME not set (access log disabled)");
                None
            }
            Err(e) => {
                error!("Auxiliary database misconfigured: {}", e);
                None
            }
        };

        let shared = SharedConnections::reopening(self, primary, auxiliary);
        shared.current().await;
        shared
    }

    async fn open_primary(&self, secrets: &PrimarySecrets) -> Result<ConnectionHandle, CoreError> {
        let tunnel = self
            .open_tunnel(
                &secrets.ssh.host,
                secrets.ssh.port,
                &secrets.ssh.user,
                &secrets.ssh.private_key_pem,
                secrets.ssh.host_fingerprint.clone(),
            )
            .await?;
        self.open_db_connection(&tunnel, &secrets.database).await
    }

    /// Closes database pools first: stopping the tunnel under a live pool
    /// would strand its connections.
    pub async fn close(&self) {
        let mut pools = self.pools.lock().await;
        for (_, handle) in pools.drain() {
            handle.pool.close().await;
        }
        info!("database pools closed");

        let mut tunnels = self.tunnels.lock().await;
        for (_, tunnel) in tunnels.drain() {
            tunnel.close().await;
        }
    }

    async fn connect(&self, options: MySqlConnectOptions) -> Result<MySqlPool, CoreError> {
        MySqlPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .acquire_timeout(self.settings.timeout)
            .connect_with(options)
            .await
            .map_err(|e| CoreError::Connection(format!("database connect failed: {e}")))
    }

    fn register(
        &self,
        pools: &mut HashMap<PoolKey, ConnectionHandle>,
        key: PoolKey,
        pool: MySqlPool,
        tunnel: Option<Arc<SshTunnel>>,
    ) -> ConnectionHandle {
        let handle = ConnectionHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            pool,
            tunnel,
        };
        pools.insert(key, handle.clone());
        handle
    }
}

/// The registered pool for `key` if it can still serve queries. A stale
/// pool is closed and dropped from the registry.
async fn reusable(
    pools: &mut HashMap<PoolKey, ConnectionHandle>,
    key: &PoolKey,
) -> Option<ConnectionHandle> {
    let existing = pools.remove(key)?;
    if existing.is_usable() {
        pools.insert(key.clone(), existing.clone());
        return Some(existing);
    }
    existing.pool.close().await;
    None
}

fn connect_options(credentials: &DatabaseCredentials, host: &str, port: u16) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(host)
        .port(port)
        .username(&credentials.user)
        .password(&credentials.password)
        .database(&credentials.database)
}

/// Runs `attempt` until it succeeds, fails permanently, or the retry budget
/// is spent. Backoff doubles after every transient failure.
pub async fn with_retry<T, F, Fut>(
    settings: &ConnectSettings,
    what: &str,
    mut attempt: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut delay = settings.backoff;
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && tries <= settings.retries => {
                warn!("{} attempt {} failed: {}. Retrying in {:?}", what, tries, e, delay);
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}
