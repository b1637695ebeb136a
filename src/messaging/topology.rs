use crate::error::Result;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};
use tracing::debug;

pub const EVENTS_EXCHANGE: &str = "lifeplaneer.events";
pub const RPC_EXCHANGE: &str = "lifeplaneer.rpc";
pub const DLX_EXCHANGE: &str = "lifeplaneer.dlx";

pub const USER_COMMANDS_QUEUE: &str = "core.user.commands";
pub const AUTH_COMMANDS_QUEUE: &str = "core.auth.commands";
pub const GATEWAY_RESPONSES_QUEUE: &str = "gateway.responses";
pub const DEAD_LETTER_QUEUE: &str = "dead-letter.queue";

/// Declare the full broker topology. Idempotent; runs on every
/// (re)connect so a fresh broker comes up with the expected shape.
pub async fn declare(channel: &Channel) -> Result<()> {
    let durable = ExchangeDeclareOptions {
        durable: true,
        ..Default::default()
    };

    channel
        .exchange_declare(
            EVENTS_EXCHANGE,
            ExchangeKind::Topic,
            durable,
            FieldTable::default(),
        )
        .await?;
    channel
        .exchange_declare(
            RPC_EXCHANGE,
            ExchangeKind::Direct,
            durable,
            FieldTable::default(),
        )
        .await?;
    channel
        .exchange_declare(
            DLX_EXCHANGE,
            ExchangeKind::Fanout,
            durable,
            FieldTable::default(),
        )
        .await?;

    let durable_queue = QueueDeclareOptions {
        durable: true,
        ..Default::default()
    };

    // Command queues dead-letter into the fanout DLX
    let mut dlx_args = FieldTable::default();
    dlx_args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(DLX_EXCHANGE.into()),
    );

    channel
        .queue_declare(USER_COMMANDS_QUEUE, durable_queue, dlx_args.clone())
        .await?;
    channel
        .queue_declare(AUTH_COMMANDS_QUEUE, durable_queue, dlx_args)
        .await?;
    channel
        .queue_declare(GATEWAY_RESPONSES_QUEUE, durable_queue, FieldTable::default())
        .await?;
    channel
        .queue_declare(DEAD_LETTER_QUEUE, durable_queue, FieldTable::default())
        .await?;

    channel
        .queue_bind(
            USER_COMMANDS_QUEUE,
            EVENTS_EXCHANGE,
            "user.*",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            AUTH_COMMANDS_QUEUE,
            EVENTS_EXCHANGE,
            "auth.*",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            DEAD_LETTER_QUEUE,
            DLX_EXCHANGE,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    debug!("Broker topology declared");
    Ok(())
}

/// Declare the exclusive auto-named reply queue for RPC responses.
/// Returns the broker-generated queue name.
pub async fn declare_reply_queue(channel: &Channel) -> Result<String> {
    let queue = channel
        .queue_declare(
            "",
            QueueDeclareOptions {
                exclusive: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    let name = queue.name().as_str().to_string();
    debug!(reply_queue = %name, "Reply queue declared");
    Ok(name)
}
