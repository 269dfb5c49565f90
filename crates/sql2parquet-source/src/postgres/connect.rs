use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use sql2parquet_config::{SourceConfig, SslMode};
use tokio::task::JoinHandle;
use tokio_postgres::{config::SslMode as PgSslMode, Client, Config, NoTls};
use tracing::{error, warn};

use crate::SourceError;

/// A client plus the task driving its socket.
///
/// The task is aborted on drop, so the server connection goes away on every
/// exit path.
pub(crate) struct PgConnection {
    pub(crate) client: Client,
    task: JoinHandle<()>,
}

impl Drop for PgConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub(crate) fn client_config(source: &SourceConfig) -> Config {
    let mut config = Config::new();
    config
        .host(&source.host)
        .port(source.port)
        .dbname(&source.database)
        .user(&source.username)
        .application_name(&source.application_name)
        .connect_timeout(source.connect_timeout())
        .ssl_mode(match source.ssl_mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
        });
    if let Some(password) = &source.password {
        config.password(password);
    }
    config
}

/// Connect, bounding the whole handshake (TCP, TLS, auth) by the connect timeout.
pub(crate) async fn connect(source: &SourceConfig) -> Result<PgConnection, SourceError> {
    let target = format!("{}:{}/{}", source.host, source.port, source.database);
    let timeout = source.connect_timeout();

    match tokio::time::timeout(timeout, establish(source, target.clone())).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::ConnectTimeout {
            target,
            secs: timeout.as_secs(),
        }),
    }
}

async fn establish(source: &SourceConfig, target: String) -> Result<PgConnection, SourceError> {
    let config = client_config(source);

    match source.ssl_mode {
        SslMode::Disable => connect_without_tls(config, target).await,
        SslMode::Require => connect_with_tls(config, target).await,
        SslMode::Prefer => match connect_with_tls(config.clone(), target.clone()).await {
            Ok(connection) => Ok(connection),
            Err(error) => {
                warn!(%error, "Postgres TLS handshake failed, retrying without TLS");
                connect_without_tls(config, target).await
            }
        },
    }
}

async fn connect_with_tls(config: Config, target: String) -> Result<PgConnection, SourceError> {
    let connector = TlsConnector::builder().build()?;
    let tls = MakeTlsConnector::new(connector);
    let (client, connection) = config
        .connect(tls)
        .await
        .map_err(|source| SourceError::Connect {
            target: target.clone(),
            source,
        })?;
    let task = tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, target = %target, "Postgres connection error");
        }
    });
    Ok(PgConnection { client, task })
}

async fn connect_without_tls(config: Config, target: String) -> Result<PgConnection, SourceError> {
    let (client, connection) = config
        .connect(NoTls)
        .await
        .map_err(|source| SourceError::Connect {
            target: target.clone(),
            source,
        })?;
    let task = tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, target = %target, "Postgres connection error");
        }
    });
    Ok(PgConnection { client, task })
}
