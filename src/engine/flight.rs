//! Arrow Flight SQL client

use super::{EngineError, QueryEngine};
use crate::config::FlightSqlConfig;
use crate::materialize::RecordReader;
use crate::metadata::Metadata;
use crate::stream::{FlightRecordReader, HeaderCapturingStream, TonicRawStream};
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::sql::client::FlightSqlServiceClient;
use arrow_flight::sql::CommandGetTables;
use arrow_flight::{FlightInfo, Ticket};
use async_trait::async_trait;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

/// [`QueryEngine`] backed by a Flight SQL server.
///
/// Every call carries the static metadata, which holds the bearer token when
/// one is configured, or the token returned by the basic auth handshake.
#[derive(Debug, Clone)]
pub struct FlightSqlEngine {
    sql: FlightSqlServiceClient<Channel>,
    flight: FlightServiceClient<Channel>,
    metadata: Metadata,
}

impl FlightSqlEngine {
    /// Open a channel and authenticate.
    ///
    /// The channel connects lazily; only a username/password handshake talks
    /// to the server here.
    pub async fn connect(
        config: &FlightSqlConfig,
        metadata: Metadata,
    ) -> Result<Self, EngineError> {
        let scheme = if config.secure { "https" } else { "http" };
        let mut endpoint = Endpoint::from_shared(format!("{scheme}://{}", config.addr))?;
        if config.secure {
            endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
        }
        let channel = endpoint.connect_lazy();

        let mut sql = FlightSqlServiceClient::new(channel.clone());
        for (key, value) in metadata.iter() {
            sql.set_header(key, value);
        }

        let basic_auth = !config.username.is_empty() || !config.password.is_empty();
        if config.token.is_empty() && basic_auth {
            sql.handshake(&config.username, &config.password).await?;
            tracing::debug!(addr = %config.addr, "flightsql_handshake_complete");
        }

        tracing::info!(addr = %config.addr, secure = config.secure, "flightsql_client_created");
        Ok(Self {
            sql,
            flight: FlightServiceClient::new(channel),
            metadata,
        })
    }

    fn request<T>(&self, message: T) -> Result<tonic::Request<T>, EngineError> {
        let mut request = tonic::Request::new(message);
        let md = request.metadata_mut();
        for (key, value) in self.metadata.iter() {
            let invalid = |message: String| EngineError::InvalidMetadata {
                key: key.to_string(),
                message,
            };
            let k: AsciiMetadataKey = key.parse().map_err(|e| invalid(format!("{e}")))?;
            let v: AsciiMetadataValue = value.parse().map_err(|e| invalid(format!("{e}")))?;
            md.append(k, v);
        }
        if let Some(token) = self.sql.token() {
            let v: AsciiMetadataValue = format!("Bearer {token}").parse().map_err(|e| {
                EngineError::InvalidMetadata {
                    key: "authorization".to_string(),
                    message: format!("{e}"),
                }
            })?;
            md.insert("authorization", v);
        }
        Ok(request)
    }
}

fn tickets(info: FlightInfo) -> Result<Vec<Ticket>, EngineError> {
    info.endpoint
        .into_iter()
        .enumerate()
        .map(|(i, ep)| ep.ticket.ok_or(EngineError::MissingTicket(i)))
        .collect()
}

#[async_trait]
impl QueryEngine for FlightSqlEngine {
    async fn execute(&self, sql: &str) -> Result<Vec<Ticket>, EngineError> {
        let mut client = self.sql.clone();
        let info = client.execute(sql.to_string(), None).await?;
        tickets(info)
    }

    async fn do_get(&self, ticket: Ticket) -> Result<Box<dyn RecordReader>, EngineError> {
        let mut client = self.flight.clone();
        let response = client.do_get(self.request(ticket)?).await?;
        let stream = HeaderCapturingStream::new(TonicRawStream::new(response));
        let reader = FlightRecordReader::open(stream).await?;
        Ok(Box::new(reader))
    }

    async fn get_tables(&self, command: CommandGetTables) -> Result<Vec<Ticket>, EngineError> {
        let mut client = self.sql.clone();
        let info = client.get_tables(command).await?;
        tickets(info)
    }

    async fn get_sql_info(&self) -> Result<Vec<Ticket>, EngineError> {
        let mut client = self.sql.clone();
        let info = client.get_sql_info(Vec::new()).await?;
        tickets(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_flight::FlightEndpoint;

    #[test]
    fn test_tickets_from_info() {
        let info = FlightInfo::new()
            .with_endpoint(FlightEndpoint::new().with_ticket(Ticket::new("a")))
            .with_endpoint(FlightEndpoint::new().with_ticket(Ticket::new("b")));
        let t = tickets(info).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t[1].ticket.as_ref(), b"b");
    }

    #[test]
    fn test_endpoint_without_ticket() {
        let info = FlightInfo::new().with_endpoint(FlightEndpoint::new());
        assert!(matches!(tickets(info), Err(EngineError::MissingTicket(0))));
    }

    #[tokio::test]
    async fn test_request_carries_metadata_and_token() {
        let config = FlightSqlConfig {
            addr: "localhost:8082".to_string(),
            token: "secret".to_string(),
            metadata: vec![[("database".to_string(), "metrics".to_string())].into()],
            ..FlightSqlConfig::default()
        };
        let engine = FlightSqlEngine::connect(&config, config.create_metadata())
            .await
            .unwrap();

        let request = engine.request(()).unwrap();
        let headers = request.metadata();
        assert_eq!(headers.get("database").unwrap(), "metrics");
        assert_eq!(headers.get("authorization").unwrap(), "Bearer secret");
    }
}
