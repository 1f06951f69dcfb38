//! RedisKv — shared network store speaking RESP2 over TCP.
//!
//! One connection is shared behind an async mutex. A batch is encoded into a
//! single buffer, written and flushed once, and then exactly one reply per
//! command is read back (Redis pipelining). There is no `MULTI`/`EXEC`: a
//! connection failure part-way through leaves an unknown prefix applied.
//!
//! The connection lifecycle belongs to the host. If a round trip fails at
//! the transport level the connection is marked broken and every later call
//! fails fast; reconnecting means building a new `RedisKv`.

use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{KvError, KvResult};
use crate::resp::{encode_command, read_frame, Frame};
use crate::store::{validate_ttl, Batch, BatchReplies, Command, KvFuture, KvStore, Reply};

/// Connection settings for [`RedisKv`].
#[derive(Debug, Clone)]
pub struct RedisOptions {
    /// `host:port` of the Redis server.
    pub address: String,
    /// Sent with `AUTH` right after connecting.
    pub password: Option<String>,
    /// Database index selected with `SELECT`.
    pub database: Option<u32>,
    pub connect_timeout: Duration,
    /// Upper bound for a single round trip (one command or one batch).
    pub timeout: Duration,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:6379".to_string(),
            password: None,
            database: None,
            connect_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(2),
        }
    }
}

struct Connection {
    stream: BufStream<TcpStream>,
    broken: bool,
}

impl Connection {
    async fn round_trip(&mut self, payload: &[u8], replies: usize) -> KvResult<Vec<Frame>> {
        self.stream.write_all(payload).await?;
        self.stream.flush().await?;
        let mut frames = Vec::with_capacity(replies);
        for _ in 0..replies {
            frames.push(read_frame(&mut self.stream).await?);
        }
        Ok(frames)
    }
}

/// Redis-backed [`KvStore`].
pub struct RedisKv {
    conn: Mutex<Connection>,
    address: String,
    timeout: Duration,
}

impl std::fmt::Debug for RedisKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKv")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RedisKv {
    /// Connect, authenticate and select the configured database.
    pub async fn connect(options: RedisOptions) -> KvResult<Self> {
        let stream = tokio::time::timeout(
            options.connect_timeout,
            TcpStream::connect(options.address.as_str()),
        )
        .await
        .map_err(|_| KvError::Timeout(options.connect_timeout))??;
        stream.set_nodelay(true)?;

        let kv = Self {
            conn: Mutex::new(Connection {
                stream: BufStream::new(stream),
                broken: false,
            }),
            address: options.address,
            timeout: options.timeout,
        };

        if let Some(password) = &options.password {
            expect_ok(kv.command(&["AUTH", password.as_str()]).await?)?;
        }
        if let Some(database) = options.database {
            let database = database.to_string();
            expect_ok(kv.command(&["SELECT", database.as_str()]).await?)?;
        }

        debug!(address = %kv.address, "redis kv store connected");
        Ok(kv)
    }

    /// Health check: `PING` must answer `PONG`.
    pub async fn ping(&self) -> KvResult<()> {
        match self.command(&["PING"]).await? {
            Frame::Simple(s) if s == "PONG" => Ok(()),
            Frame::Error(message) => Err(KvError::Server(message)),
            other => Err(KvError::Protocol(format!("unexpected PING reply: {other:?}"))),
        }
    }

    async fn command(&self, args: &[&str]) -> KvResult<Frame> {
        let mut payload = Vec::new();
        encode_command(args, &mut payload);
        let mut frames = self.pipeline(&payload, 1).await?;
        frames
            .pop()
            .ok_or_else(|| KvError::Protocol("missing reply".to_string()))
    }

    /// Send `payload` and read `replies` frames, bounded by the round-trip
    /// timeout. Any transport failure poisons the connection.
    ///
    /// The connection stays marked broken while a round trip is in flight,
    /// so a caller that drops this future midway leaves unread replies
    /// behind a poisoned connection instead of handing them to the next
    /// command.
    async fn pipeline(&self, payload: &[u8], replies: usize) -> KvResult<Vec<Frame>> {
        let mut conn = self.conn.lock().await;
        if conn.broken {
            return Err(KvError::Io(format!(
                "connection to {} is broken",
                self.address
            )));
        }

        conn.broken = true;
        let result = match tokio::time::timeout(self.timeout, conn.round_trip(payload, replies))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(KvError::Timeout(self.timeout)),
        };

        match &result {
            Ok(_) => conn.broken = false,
            Err(e) => {
                warn!(address = %self.address, error = %e, "redis round trip failed, connection marked broken");
            }
        }
        result
    }
}

impl KvStore for RedisKv {
    fn get<'a>(&'a self, key: &'a str) -> KvFuture<'a, Option<String>> {
        Box::pin(async move { get_reply(self.command(&["GET", key]).await?) })
    }

    fn set_ex<'a>(&'a self, key: &'a str, value: &'a str, ttl: Duration) -> KvFuture<'a, ()> {
        Box::pin(async move {
            let secs = validate_ttl(ttl)?.to_string();
            expect_ok(self.command(&["SET", key, value, "EX", secs.as_str()]).await?)
        })
    }

    fn exec(&self, batch: Batch) -> KvFuture<'_, BatchReplies> {
        Box::pin(async move {
            let commands = batch.into_commands();

            // Commands that fail validation never reach the wire; they keep
            // their slot in the reply vector.
            let mut payload = Vec::new();
            let mut slots: Vec<KvResult<()>> = Vec::with_capacity(commands.len());
            for command in &commands {
                match command {
                    Command::Get { key } => {
                        encode_command(&["GET", key.as_str()], &mut payload);
                        slots.push(Ok(()));
                    }
                    Command::SetEx { key, value, ttl } => match validate_ttl(*ttl) {
                        Ok(secs) => {
                            let secs = secs.to_string();
                            encode_command(
                                &["SET", key.as_str(), value.as_str(), "EX", secs.as_str()],
                                &mut payload,
                            );
                            slots.push(Ok(()));
                        }
                        Err(e) => slots.push(Err(e)),
                    },
                }
            }

            let sent = slots.iter().filter(|slot| slot.is_ok()).count();
            let frames = if sent == 0 {
                Vec::new()
            } else {
                self.pipeline(&payload, sent)
                    .await
                    .map_err(|e| KvError::BatchFailed(e.to_string()))?
            };
            debug!(commands = commands.len(), sent, "redis batch executed");

            let mut frames = frames.into_iter();
            let replies = commands
                .iter()
                .zip(slots)
                .map(|(command, slot)| {
                    slot?;
                    let frame = frames
                        .next()
                        .ok_or_else(|| KvError::Protocol("missing reply".to_string()))?;
                    match command {
                        Command::Get { .. } => get_reply(frame).map(Reply::Value),
                        Command::SetEx { .. } => expect_ok(frame).map(|()| Reply::Ok),
                    }
                })
                .collect();
            Ok(replies)
        })
    }
}

fn get_reply(frame: Frame) -> KvResult<Option<String>> {
    match frame {
        Frame::Bulk(None) => Ok(None),
        Frame::Bulk(Some(bytes)) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| KvError::Deserialize(e.to_string())),
        Frame::Error(message) => Err(KvError::Server(message)),
        other => Err(KvError::Protocol(format!("unexpected GET reply: {other:?}"))),
    }
}

fn expect_ok(frame: Frame) -> KvResult<()> {
    match frame {
        Frame::Simple(s) if s == "OK" => Ok(()),
        Frame::Error(message) => Err(KvError::Server(message)),
        other => Err(KvError::Protocol(format!("unexpected reply: {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_reply_maps_nil_to_absent() {
        assert_eq!(get_reply(Frame::Bulk(None)), Ok(None));
        assert_eq!(
            get_reply(Frame::Bulk(Some(b"shutdown".to_vec()))),
            Ok(Some("shutdown".to_string()))
        );
        assert!(matches!(
            get_reply(Frame::Error("WRONGTYPE".to_string())),
            Err(KvError::Server(_))
        ));
        assert!(matches!(
            get_reply(Frame::Integer(1)),
            Err(KvError::Protocol(_))
        ));
    }

    #[test]
    fn expect_ok_rejects_other_replies() {
        assert_eq!(expect_ok(Frame::Simple("OK".to_string())), Ok(()));
        assert!(expect_ok(Frame::Simple("QUEUED".to_string())).is_err());
        assert!(matches!(
            expect_ok(Frame::Error("ERR invalid expire time".to_string())),
            Err(KvError::Server(_))
        ));
    }

    #[test]
    fn default_options_point_at_local_redis() {
        let options = RedisOptions::default();
        assert_eq!(options.address, "127.0.0.1:6379");
        assert!(options.password.is_none());
    }
}
