//! Active listener handle.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;

use crate::connection::Command;
use crate::event::Event;

/// A registered listener. Yields [`Event`]s as the backend reports
/// changes; dropping the handle tears the listener down.
#[derive(Debug)]
pub struct Subscription {
	key: Box<str>,
	cmd_tx: mpsc::UnboundedSender<Command>,
	rx: mpsc::UnboundedReceiver<Event>,
}

impl Subscription {
	pub(crate) fn new(
		key: Box<str>,
		cmd_tx: mpsc::UnboundedSender<Command>,
		rx: mpsc::UnboundedReceiver<Event>,
	) -> Self {
		Subscription { key, cmd_tx, rx }
	}

	/// The client-side subscription key.
	pub fn id(&self) -> &str {
		&self.key
	}

	/// The next event, or `None` once the listener is gone (connection
	/// closed or the subscription was rejected by the backend).
	pub async fn next_event(&mut self) -> Option<Event> {
		self.rx.recv().await
	}

	/// Tear the listener down explicitly. Equivalent to dropping the
	/// handle.
	pub fn unsubscribe(self) {}
}

impl Stream for Subscription {
	type Item = Event;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
		self.rx.poll_recv(cx)
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		let _ = self.cmd_tx.send(Command::Unsubscribe { key: self.key.clone() });
	}
}

// vim: ts=4
