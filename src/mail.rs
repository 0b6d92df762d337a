//! Queue account emails (confirmation, password reset) on RabbitMQ.

use std::borrow::Cow;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{
    AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo,
};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, RecoveryConfig,
};
use serde::Serialize;
use url::Url;

use crate::config::Mail;
use crate::error::{Result, ServerError};
use crate::user::User;

const AMQP_DEFAULTS: (&str, u16, &str) = ("localhost", 5672, "/");

const EVENT_TYPE: &str = "com.dorado.email";
const EVENT_SOURCE: &str = "com.dorado.api";

/// Email templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Link to confirm a freshly registered account.
    AccountConfirmation,
    /// Link to choose a new password.
    PasswordReset,
}

#[derive(Debug, Serialize)]
struct Cloudevent<'a> {
    specversion: &'static str,
    r#type: &'static str,
    source: &'static str,
    id: String,
    time: String,
    datacontenttype: &'static str,
    data: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    to: Cow<'a, str>,
    name: Cow<'a, str>,
    template: Template,
    token: Cow<'a, str>,
}

/// Mail queue publisher. Without a connection, events are dropped.
#[derive(Debug, Clone, Default)]
pub struct MailManager {
    queue: String,
    conn: Option<Arc<Connection>>,
}

impl MailManager {
    /// Connect to the broker described by `config`.
    pub async fn new(config: &Mail) -> Result<Self> {
        let uri = amqp_uri(config)?;
        let host = uri.authority.host.clone();

        let properties = ConnectionProperties::default()
            .with_connection_name("dorado_mail_client".into())
            .with_experimental_recovery_config(
                RecoveryConfig::default().auto_recover_connection(),
            );
        let conn = Connection::connect_uri(uri, properties)
            .await
            .map_err(|err| ServerError::internal("rabbitmq connection", err))?;

        tracing::info!(%host, queue = config.queue, "rabbitmq connected");
        Ok(Self {
            queue: config.queue.clone(),
            conn: Some(Arc::new(conn)),
        })
    }

    /// Fresh channel on a durable queue.
    async fn channel(&self, conn: &Connection) -> lapin::Result<Channel> {
        let channel = conn.create_channel().await?;
        let durable = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };
        channel
            .queue_declare(&self.queue, durable, FieldTable::default())
            .await?;
        Ok(channel)
    }

    fn create_event(data: Content) -> Cloudevent {
        Cloudevent {
            specversion: "1.0",
            r#type: EVENT_TYPE,
            source: EVENT_SOURCE,
            id: uuid::Uuid::new_v4().simple().to_string(),
            time: Utc::now().to_rfc3339(),
            datacontenttype: "application/json",
            data,
        }
    }

    /// Publish `template` for `user`, carrying the single-use `token`.
    pub async fn publish_event(
        &self,
        template: Template,
        user: &User,
        token: &str,
    ) -> Result<()> {
        let Some(conn) = &self.conn else {
            tracing::debug!(?template, "no mail queue, event dropped");
            return Ok(());
        };

        let content = Content {
            to: Cow::from(&user.email),
            name: Cow::from(&user.name),
            template,
            token: Cow::from(token),
        };
        let payload = serde_json::to_string(&Self::create_event(content))
            .map_err(|err| ServerError::internal("event encoding", err))?;

        let properties = BasicProperties::default()
            .with_content_encoding("utf8".into())
            .with_content_type("application/cloudevents+json".into());
        let publish = async {
            self.channel(conn)
                .await?
                .basic_publish(
                    "",
                    &self.queue,
                    BasicPublishOptions::default(),
                    payload.as_bytes(),
                    properties,
                )
                .await
                .map(|_confirm| ())
        };
        publish
            .await
            .map_err(|err| ServerError::internal("event publication", err))?;

        tracing::trace!(?template, "event sent");

        Ok(())
    }
}

/// `amqp://host:port` from the config plus its credentials and vhost.
fn amqp_uri(config: &Mail) -> Result<AMQPUri> {
    let (default_host, default_port, default_vhost) = AMQP_DEFAULTS;

    let addr = Url::parse(&config.address)
        .map_err(|err| ServerError::internal("invalid rabbitmq url", err))?;
    let scheme =
        AMQPScheme::from_str(addr.scheme()).map_err(|err| ServerError::Internal {
            details: format!("invalid rabbitmq scheme: {err}"),
            source: None,
        })?;

    Ok(AMQPUri {
        scheme,
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            host: addr.host_str().unwrap_or(default_host).to_owned(),
            port: addr.port().unwrap_or(default_port),
        },
        vhost: config.vhost.as_deref().unwrap_or(default_vhost).to_owned(),
        query: AMQPQueryString {
            channel_max: config.pool,
            ..Default::default()
        },
    })
}
