use std::{fs::File, io::BufReader, path::PathBuf, sync::Arc};

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ProtocolVersion, ServerConfig, ServerConnection, SupportedCipherSuite,
        pki_types::{CertificateDer, PrivateKeyDer},
    },
    server::TlsStream,
};

use crate::{
    error::{ConnectionResult, TlsError, TlsResult},
    tracing,
};

/// Certificate and key used to answer STARTTLS/STLS upgrades.
#[derive(Clone, Debug, Deserialize)]
pub struct TlsConfig {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

/// What was negotiated during a TLS handshake.
#[derive(Debug)]
pub struct TlsInfo {
    version: ProtocolVersion,
    ciphers: SupportedCipherSuite,
}

impl TlsInfo {
    fn of(conn: &ServerConnection) -> TlsResult<Self> {
        Ok(Self {
            version: conn
                .protocol_version()
                .ok_or_else(|| TlsError::Rustls("protocol version missing".to_string()))?,
            ciphers: conn
                .negotiated_cipher_suite()
                .ok_or_else(|| TlsError::Rustls("cipher suite missing".to_string()))?,
        })
    }

    #[must_use]
    pub fn proto(&self) -> String {
        self.version.as_str().map(str::to_string).unwrap_or_default()
    }

    #[must_use]
    pub fn cipher(&self) -> String {
        self.ciphers
            .suite()
            .as_str()
            .map(str::to_string)
            .unwrap_or_default()
    }
}

/// One accepted socket, before or after its TLS upgrade.
pub enum Connection<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> {
    Plain { stream: Stream },
    Tls { stream: Box<TlsStream<Stream>> },
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Connection<Stream> {
    pub const fn plain(stream: Stream) -> Self {
        Self::Plain { stream }
    }

    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls { .. })
    }

    /// Write one wire line, appending CRLF.
    pub async fn send(&mut self, line: &str) -> ConnectionResult<()> {
        let mut buffer = String::with_capacity(line.len() + 2);
        buffer.push_str(line);
        buffer.push_str("\r\n");

        match self {
            Self::Plain { stream } => stream.write_all(buffer.as_bytes()).await?,
            Self::Tls { stream } => stream.write_all(buffer.as_bytes()).await?,
        }

        Ok(())
    }

    pub async fn flush(&mut self) -> ConnectionResult<()> {
        match self {
            Self::Plain { stream } => stream.flush().await?,
            Self::Tls { stream } => stream.flush().await?,
        }

        Ok(())
    }

    /// Read whatever bytes are available into `buf`; 0 means the peer is
    /// done writing.
    pub async fn receive(&mut self, buf: &mut [u8]) -> ConnectionResult<usize> {
        Ok(match self {
            Self::Plain { stream } => stream.read(buf).await?,
            Self::Tls { stream } => stream.read(buf).await?,
        })
    }

    fn load_certs<P: AsRef<std::path::Path>>(
        path: &P,
    ) -> std::io::Result<Vec<CertificateDer<'static>>> {
        rustls_pemfile::certs(&mut BufReader::new(File::open(path)?)).collect()
    }

    fn load_keys<P: AsRef<std::path::Path>>(path: &P) -> TlsResult<PrivateKeyDer<'static>> {
        let path_str = path.as_ref().display().to_string();
        let mut reader = BufReader::new(File::open(path).map_err(|e| TlsError::KeyLoad {
            path: path_str.clone(),
            reason: e.to_string(),
        })?);

        match rustls_pemfile::read_one(&mut reader).map_err(|e| TlsError::KeyLoad {
            path: path_str.clone(),
            reason: e.to_string(),
        })? {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => Ok(PrivateKeyDer::Pkcs1(key)),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => Ok(PrivateKeyDer::Pkcs8(key)),
            Some(rustls_pemfile::Item::Sec1Key(key)) => Ok(PrivateKeyDer::Sec1(key)),
            _ => Err(TlsError::KeyLoad {
                path: path_str,
                reason: "Unable to determine key file format (expected PKCS1, PKCS8, or SEC1)"
                    .to_string(),
            }),
        }
    }

    /// Perform the server side of a TLS handshake on this connection.
    pub async fn upgrade(self, tls_config: &TlsConfig) -> TlsResult<(Self, TlsInfo)> {
        tracing::debug!("Upgrading connection ...");

        let certs =
            Self::load_certs(&tls_config.certificate).map_err(|e| TlsError::CertificateLoad {
                path: tls_config.certificate.display().to_string(),
                source: e,
            })?;
        let keys = Self::load_keys(&tls_config.key)?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, keys)?;

        let acceptor = TlsAcceptor::from(Arc::new(config));

        Ok(match self {
            Self::Plain { stream } => {
                let stream = acceptor.accept(stream).await?;
                let info = TlsInfo::of(stream.get_ref().1)?;

                (
                    Self::Tls {
                        stream: Box::new(stream),
                    },
                    info,
                )
            }
            Self::Tls { stream } => {
                let (stream, connection) = acceptor.accept(stream).await?.into_inner();

                (Self::Tls { stream }, TlsInfo::of(&connection)?)
            }
        })
    }
}
