//! WebSocket connection management.
//!
//! A single actor task owns the socket for one database. Handles talk to
//! it over an unbounded command channel:
//!
//! - requests are correlated to response frames by message id, each
//!   parked on a oneshot until the backend answers
//! - `change` frames are routed to per-subscription channels
//! - a heartbeat ping keeps the connection alive
//! - when the socket drops while listeners or on-disconnect writes are
//!   registered, the actor reconnects with exponential backoff,
//!   re-authenticates, re-subscribes, and re-registers disconnect writes
//!
//! Dialing is lazy: the actor sits idle until the first command that
//! needs the wire.

use std::collections::HashMap;
use std::time::Duration;

use futures::sink::SinkExt;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use ember_types::utils::random_id;

use crate::event::{Event, EventType};
use crate::logging;
use crate::path::Path;
use crate::prelude::*;
use crate::protocol::{OnDisconnectOp, RemoteEvent, WireMessage};
use crate::query::Query;
use crate::snapshot::DataSnapshot;

const HEARTBEAT_SECS: u64 = 30;
const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_CAP_MS: u64 = 30_000;

pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

#[derive(Debug, Clone)]
pub(crate) struct ConnectionConfig {
	/// WebSocket endpoint, e.g. `wss://host/.ws?v=2`.
	pub endpoint: Box<str>,
	pub auth_token: Option<Box<str>>,
	pub request_timeout: Duration,
}

pub(crate) enum Command {
	Request {
		msg: WireMessage,
		reply: oneshot::Sender<EmResult<WireMessage>>,
	},
	Subscribe {
		path: Path,
		events: Vec<EventType>,
		query: Option<Query>,
		reply: oneshot::Sender<EmResult<(Box<str>, mpsc::UnboundedReceiver<Event>)>>,
	},
	Unsubscribe {
		key: Box<str>,
	},
	OnDisconnect {
		op: OnDisconnectOp,
		reply: oneshot::Sender<EmResult<WireMessage>>,
	},
	GoOffline,
	GoOnline,
	Close,
}

/// Handle to the connection actor. Cloned into every `Reference`.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionHandle {
	cmd_tx: mpsc::UnboundedSender<Command>,
	request_timeout: Duration,
}

impl ConnectionHandle {
	/// Spawn the actor. No I/O happens until the first command.
	pub(crate) fn spawn(config: ConnectionConfig) -> Self {
		let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
		let request_timeout = config.request_timeout;
		let actor = Actor::new(config);
		tokio::spawn(actor.run(cmd_rx));
		ConnectionHandle { cmd_tx, request_timeout }
	}

	/// Send a request and wait for the correlated response frame.
	pub(crate) async fn request(&self, msg: WireMessage) -> EmResult<WireMessage> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.cmd_tx
			.send(Command::Request { msg, reply: reply_tx })
			.map_err(|_| Error::Disconnected)?;
		let frame = match tokio::time::timeout(self.request_timeout, reply_rx).await {
			Ok(result) => result??,
			Err(_) => return Err(Error::Timeout),
		};
		if frame.is_error() {
			return Err(frame.to_error());
		}
		Ok(frame)
	}

	/// Register a listener. Returns the client-side subscription key and
	/// the event channel.
	pub(crate) async fn subscribe(
		&self,
		path: Path,
		events: Vec<EventType>,
		query: Option<Query>,
	) -> EmResult<(Box<str>, mpsc::UnboundedReceiver<Event>)> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.cmd_tx
			.send(Command::Subscribe { path, events, query, reply: reply_tx })
			.map_err(|_| Error::Disconnected)?;
		match tokio::time::timeout(self.request_timeout, reply_rx).await {
			Ok(result) => result?,
			Err(_) => Err(Error::Timeout),
		}
	}

	pub(crate) fn unsubscribe(&self, key: &str) {
		let _ = self.cmd_tx.send(Command::Unsubscribe { key: key.into() });
	}

	pub(crate) async fn on_disconnect(&self, op: OnDisconnectOp) -> EmResult<()> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.cmd_tx
			.send(Command::OnDisconnect { op, reply: reply_tx })
			.map_err(|_| Error::Disconnected)?;
		let frame = match tokio::time::timeout(self.request_timeout, reply_rx).await {
			Ok(result) => result??,
			Err(_) => return Err(Error::Timeout),
		};
		if frame.is_error() {
			return Err(frame.to_error());
		}
		Ok(())
	}

	pub(crate) fn go_offline(&self) {
		let _ = self.cmd_tx.send(Command::GoOffline);
	}

	pub(crate) fn go_online(&self) {
		let _ = self.cmd_tx.send(Command::GoOnline);
	}

	pub(crate) fn close(&self) {
		let _ = self.cmd_tx.send(Command::Close);
	}

	pub(crate) fn command_sender(&self) -> mpsc::UnboundedSender<Command> {
		self.cmd_tx.clone()
	}
}

/// Exponential backoff: 1s doubled per attempt, capped at 30s.
fn backoff_delay(attempt: u32) -> Duration {
	let millis = BACKOFF_BASE_MS.saturating_mul(1_u64 << attempt.min(16));
	Duration::from_millis(millis.min(BACKOFF_CAP_MS))
}

struct SubscriptionState {
	path: Path,
	events: Vec<EventType>,
	query: Option<Query>,
	tx: mpsc::UnboundedSender<Event>,
	server_id: Option<Box<str>>,
}

enum SessionEnd {
	/// All handles dropped or `Close` received.
	Close,
	/// The user asked to go offline; idle without reconnecting.
	Offline,
	/// The socket dropped underneath us.
	Dropped,
}

enum IdleOutcome {
	/// Time to dial, optionally carrying the command that woke us.
	Dial(Option<Command>),
	Close,
}

struct Actor {
	config: ConnectionConfig,
	/// Request id -> reply slot.
	pending: HashMap<String, oneshot::Sender<EmResult<WireMessage>>>,
	/// Subscribe-request id -> client subscription key.
	pending_subscribes: HashMap<String, Box<str>>,
	/// Client subscription key -> state.
	subs: HashMap<Box<str>, SubscriptionState>,
	/// Server subscription id -> client subscription key.
	server_to_client: HashMap<Box<str>, Box<str>>,
	/// Registered disconnect writes, replayed after reconnect.
	on_disconnect_ops: Vec<OnDisconnectOp>,
	online: bool,
	backoff_attempt: u32,
	reconnect_at: Option<Instant>,
}

impl Actor {
	fn new(config: ConnectionConfig) -> Self {
		Actor {
			config,
			pending: HashMap::new(),
			pending_subscribes: HashMap::new(),
			subs: HashMap::new(),
			server_to_client: HashMap::new(),
			on_disconnect_ops: Vec::new(),
			online: true,
			backoff_attempt: 0,
			reconnect_at: None,
		}
	}

	async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
		let mut wake: Option<Command> = None;

		loop {
			if wake.is_none() {
				match self.idle(&mut cmd_rx).await {
					IdleOutcome::Dial(cmd) => wake = cmd,
					IdleOutcome::Close => break,
				}
			}

			match self.dial().await {
				Ok((mut sink, frame_rx, reader)) => {
					self.backoff_attempt = 0;
					self.reconnect_at = None;
					if self.establish(&mut sink).await.is_err() {
						reader.abort();
						if let Some(cmd) = wake.take() {
							reject_offline(cmd);
						}
						self.after_drop();
						continue;
					}
					if let Some(cmd) = wake.take() {
						if !self.handle_session_command(cmd, &mut sink).await {
							reader.abort();
							self.after_drop();
							continue;
						}
					}
					let end = self.session(&mut cmd_rx, &mut sink, frame_rx).await;
					reader.abort();
					match end {
						SessionEnd::Close => {
							let _ = sink.send(Message::Close(None)).await;
							break;
						}
						SessionEnd::Offline => {
							let _ = sink.send(Message::Close(None)).await;
							self.fail_pending();
						}
						SessionEnd::Dropped => self.after_drop(),
					}
				}
				Err(e) => {
					warn!("Failed to connect to {}: {}", self.config.endpoint, e);
					if let Some(cmd) = wake.take() {
						reject(cmd, e);
					}
					self.after_drop();
				}
			}
		}

		debug!("Connection actor for {} stopped", self.config.endpoint);
	}

	/// Disconnected state: service commands that do not need the wire and
	/// wait for one that does (or for the reconnect timer).
	async fn idle(&mut self, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) -> IdleOutcome {
		loop {
			let deadline = self.reconnect_at;
			tokio::select! {
				cmd = cmd_rx.recv() => match cmd {
					None | Some(Command::Close) => return IdleOutcome::Close,
					Some(Command::GoOffline) => {
						self.online = false;
						self.reconnect_at = None;
					}
					Some(Command::GoOnline) => {
						self.online = true;
						if self.needs_wire() {
							return IdleOutcome::Dial(None);
						}
					}
					Some(Command::Unsubscribe { key }) => {
						self.remove_subscription(&key);
					}
					Some(cmd) => {
						if self.online {
							return IdleOutcome::Dial(Some(cmd));
						}
						reject_offline(cmd);
					}
				},
				() = sleep_until_opt(deadline) => {
					self.reconnect_at = None;
					if self.online && self.needs_wire() {
						return IdleOutcome::Dial(None);
					}
				}
			}
		}
	}

	async fn dial(
		&self,
	) -> EmResult<(WsSink, mpsc::UnboundedReceiver<WireMessage>, tokio::task::JoinHandle<()>)> {
		debug!("Dialing {}", self.config.endpoint);
		let (ws, _response) = connect_async(self.config.endpoint.as_ref())
			.await
			.map_err(|e| Error::Connection(e.to_string()))?;
		let (sink, stream) = ws.split();

		let (frame_tx, frame_rx) = mpsc::unbounded_channel();
		let reader = tokio::spawn(read_frames(stream, frame_tx));

		info!("Connected to {}", self.config.endpoint);
		Ok((sink, frame_rx, reader))
	}

	/// Post-connect setup: authenticate, re-subscribe, re-register
	/// disconnect writes.
	async fn establish(&mut self, sink: &mut WsSink) -> EmResult<()> {
		if let Some(token) = &self.config.auth_token {
			send_frame(sink, &WireMessage::auth(token)).await?;
		}

		let keys: Vec<Box<str>> = self.subs.keys().cloned().collect();
		for key in keys {
			if let Some(sub) = self.subs.get_mut(&key) {
				sub.server_id = None;
				let frame = WireMessage::subscribe(&sub.path, &sub.events, sub.query.as_ref());
				let id = id_key(&frame.id);
				send_frame(sink, &frame).await?;
				self.pending_subscribes.insert(id, key);
			}
		}

		for op in &self.on_disconnect_ops {
			let frame = WireMessage::on_disconnect(op)?;
			send_frame(sink, &frame).await?;
		}
		Ok(())
	}

	/// Connected state. Returns how the session ended.
	async fn session(
		&mut self,
		cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
		sink: &mut WsSink,
		mut frame_rx: mpsc::UnboundedReceiver<WireMessage>,
	) -> SessionEnd {
		let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));

		loop {
			tokio::select! {
				cmd = cmd_rx.recv() => match cmd {
					None | Some(Command::Close) => return SessionEnd::Close,
					Some(Command::GoOffline) => {
						self.online = false;
						return SessionEnd::Offline;
					}
					Some(Command::GoOnline) => {}
					Some(cmd) => {
						if !self.handle_session_command(cmd, sink).await {
							return SessionEnd::Dropped;
						}
					}
				},
				frame = frame_rx.recv() => match frame {
					Some(msg) => self.handle_frame(msg),
					None => return SessionEnd::Dropped,
				},
				_ = heartbeat.tick() => {
					if sink.send(Message::Ping(Vec::new())).await.is_err() {
						debug!("Heartbeat failed, connection lost");
						return SessionEnd::Dropped;
					}
				}
			}
		}
	}

	/// Send one command over the wire. Returns false if the socket died.
	async fn handle_session_command(&mut self, cmd: Command, sink: &mut WsSink) -> bool {
		match cmd {
			Command::Request { msg, reply } => {
				let id = id_key(&msg.id);
				match send_frame(sink, &msg).await {
					Ok(()) => {
						self.pending.insert(id, reply);
						true
					}
					Err(e) => {
						let _ = reply.send(Err(e));
						false
					}
				}
			}
			Command::Subscribe { path, events, query, reply } => {
				let key: Box<str> = random_id().into();
				let (tx, rx) = mpsc::unbounded_channel();
				let frame = WireMessage::subscribe(&path, &events, query.as_ref());
				let id = id_key(&frame.id);
				match send_frame(sink, &frame).await {
					Ok(()) => {
						self.subs.insert(
							key.clone(),
							SubscriptionState { path, events, query, tx, server_id: None },
						);
						self.pending_subscribes.insert(id, key.clone());
						let _ = reply.send(Ok((key, rx)));
						true
					}
					Err(e) => {
						let _ = reply.send(Err(e));
						false
					}
				}
			}
			Command::Unsubscribe { key } => {
				if let Some(server_id) = self.remove_subscription(&key) {
					let frame = WireMessage::unsubscribe(&server_id);
					if send_frame(sink, &frame).await.is_err() {
						return false;
					}
				}
				true
			}
			Command::OnDisconnect { op, reply } => {
				self.record_on_disconnect(&op);
				let frame = match WireMessage::on_disconnect(&op) {
					Ok(frame) => frame,
					Err(e) => {
						let _ = reply.send(Err(e));
						return true;
					}
				};
				let id = id_key(&frame.id);
				match send_frame(sink, &frame).await {
					Ok(()) => {
						self.pending.insert(id, reply);
						true
					}
					Err(e) => {
						let _ = reply.send(Err(e));
						false
					}
				}
			}
			// Close/GoOffline/GoOnline are handled by the session loop
			Command::Close | Command::GoOffline | Command::GoOnline => true,
		}
	}

	fn handle_frame(&mut self, msg: WireMessage) {
		if logging::wire_logging_enabled() {
			debug!("<- {} {}", msg.msg_type, msg.id);
		}

		if msg.msg_type == "change" {
			match msg.to_change() {
				Ok(change) => self.route_change(&change.subscription_id, change.event),
				Err(e) => warn!("Malformed change frame: {}", e),
			}
			return;
		}

		let id = id_key(&msg.id);

		if let Some(key) = self.pending_subscribes.remove(&id) {
			if msg.is_error() {
				warn!("Subscribe failed: {}", msg.to_error());
				self.remove_subscription(&key);
				return;
			}
			if let Some(server_id) = msg.payload.get("subscriptionId").and_then(Value::as_str) {
				if let Some(sub) = self.subs.get_mut(&key) {
					sub.server_id = Some(server_id.into());
					self.server_to_client.insert(server_id.into(), key);
				}
			} else {
				warn!("Subscribe response without subscriptionId");
				self.remove_subscription(&key);
			}
			return;
		}

		if let Some(reply) = self.pending.remove(&id) {
			let _ = reply.send(Ok(msg));
			return;
		}

		debug!("Unmatched frame: type={} id={}", msg.msg_type, msg.id);
	}

	fn route_change(&mut self, server_id: &str, remote: RemoteEvent) {
		let Some(key) = self.server_to_client.get(server_id) else {
			debug!("Change for unknown subscription {}", server_id);
			return;
		};
		let event = match remote_to_event(remote) {
			Ok(event) => event,
			Err(e) => {
				warn!("Malformed event payload: {}", e);
				return;
			}
		};
		let closed = match self.subs.get(key) {
			Some(sub) => sub.tx.send(event).is_err(),
			None => false,
		};
		if closed {
			// Listener dropped its receiver without unsubscribing
			let key = key.clone();
			self.remove_subscription(&key);
		}
	}

	/// Drop a subscription and return its server id if one was assigned.
	fn remove_subscription(&mut self, key: &str) -> Option<Box<str>> {
		let sub = self.subs.remove(key)?;
		if let Some(server_id) = &sub.server_id {
			self.server_to_client.remove(server_id);
		}
		sub.server_id
	}

	fn record_on_disconnect(&mut self, op: &OnDisconnectOp) {
		match op {
			OnDisconnectOp::Cancel { path } => {
				self.on_disconnect_ops.retain(|existing| existing.path() != path);
			}
			_ => self.on_disconnect_ops.push(op.clone()),
		}
	}

	fn needs_wire(&self) -> bool {
		!self.subs.is_empty() || !self.on_disconnect_ops.is_empty()
	}

	/// Cleanup after an unexpected drop: fail in-flight requests and
	/// schedule a reconnect if anything persistent is registered.
	fn after_drop(&mut self) {
		self.fail_pending();
		if self.online && self.needs_wire() {
			let delay = backoff_delay(self.backoff_attempt);
			self.backoff_attempt = self.backoff_attempt.saturating_add(1);
			debug!("Reconnecting to {} in {:?}", self.config.endpoint, delay);
			self.reconnect_at = Some(Instant::now() + delay);
		}
	}

	fn fail_pending(&mut self) {
		for (_, reply) in self.pending.drain() {
			let _ = reply.send(Err(Error::Disconnected));
		}
		self.pending_subscribes.clear();
		self.server_to_client.clear();
		for sub in self.subs.values_mut() {
			sub.server_id = None;
		}
	}
}

async fn read_frames(
	mut stream: SplitStream<WsStream>,
	frame_tx: mpsc::UnboundedSender<WireMessage>,
) {
	while let Some(item) = stream.next().await {
		match item {
			Ok(ws_msg) => match WireMessage::from_ws_message(&ws_msg) {
				Ok(Some(frame)) => {
					if frame_tx.send(frame).is_err() {
						return;
					}
				}
				Ok(None) => {}
				Err(e) => warn!("Failed to parse frame: {}", e),
			},
			Err(e) => {
				debug!("Connection error: {}", e);
				return;
			}
		}
	}
}

async fn send_frame(sink: &mut WsSink, frame: &WireMessage) -> EmResult<()> {
	if logging::wire_logging_enabled() {
		debug!("-> {} {}", frame.msg_type, frame.id);
	}
	let ws_msg = frame.to_ws_message()?;
	sink.send(ws_msg).await.map_err(|e| Error::Connection(e.to_string()))
}

/// Correlation key for a message id (ids can be strings or numbers).
fn id_key(id: &Value) -> String {
	id.to_string()
}

fn remote_to_event(remote: RemoteEvent) -> EmResult<Event> {
	let event_type = EventType::from_wire_name(&remote.action)?;
	let path = Path::parse(&remote.path)?;
	Ok(Event {
		event_type,
		snapshot: DataSnapshot::new(path, remote.data),
		prev_name: remote.prev_name,
	})
}

fn reject(cmd: Command, err: Error) {
	match cmd {
		Command::Request { reply, .. } | Command::OnDisconnect { reply, .. } => {
			let _ = reply.send(Err(err));
		}
		Command::Subscribe { reply, .. } => {
			let _ = reply.send(Err(err));
		}
		_ => {}
	}
}

fn reject_offline(cmd: Command) {
	reject(cmd, Error::Connection("client is offline".to_string()));
}

async fn sleep_until_opt(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => futures::future::pending().await,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_backoff_doubles_and_caps() {
		assert_eq!(backoff_delay(0), Duration::from_secs(1));
		assert_eq!(backoff_delay(1), Duration::from_secs(2));
		assert_eq!(backoff_delay(3), Duration::from_secs(8));
		assert_eq!(backoff_delay(5), Duration::from_secs(30));
		assert_eq!(backoff_delay(60), Duration::from_secs(30));
	}

	#[test]
	fn test_id_key_distinguishes_types() {
		assert_ne!(id_key(&Value::from(7)), id_key(&Value::from("7")));
	}

	#[test]
	fn test_remote_to_event() {
		let remote = RemoteEvent {
			action: "value".to_string(),
			path: "rooms/lobby".to_string(),
			data: serde_json::json!({"topic": "general"}),
			prev_name: None,
		};
		let event = remote_to_event(remote).unwrap();
		assert_eq!(event.event_type, EventType::Value);
		assert_eq!(event.snapshot.key(), Some("lobby"));
	}

	#[test]
	fn test_remote_to_event_bad_action() {
		let remote = RemoteEvent {
			action: "mutated".to_string(),
			path: "x".to_string(),
			data: Value::Null,
			prev_name: None,
		};
		assert!(remote_to_event(remote).is_err());
	}
}

// vim: ts=4
