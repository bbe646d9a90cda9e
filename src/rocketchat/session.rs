//! the login session shared by all webhook requests

use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
/// credentials returned by `/api/v1/login`
pub struct Session {
	pub user_id: String,
	pub auth_token: String,
}

/// Holds the current [Session]. A session is replaced as a whole, readers get
/// a copy and never keep the lock across a request.
#[derive(Debug)]
pub struct SessionStore {
	inner: RwLock<Option<Session>>,
}

impl SessionStore {
	pub fn new() -> Self {
		Self { inner: RwLock::new(None) }
	}

	/// copy of the current session, [None] if we never logged in
	pub async fn current(&self) -> Option<Session> {
		self.inner.read().await.clone()
	}

	/// replace the stored session, last write wins
	pub async fn replace(&self, session: Session) {
		*self.inner.write().await = Some(session);
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;

	fn session(n: usize) -> Session {
		Session { user_id: format!("user-{n}"), auth_token: format!("token-{n}") }
	}

	#[tokio::test]
	async fn starts_unauthenticated() {
		assert_eq!(SessionStore::new().current().await, None);
	}

	#[tokio::test]
	async fn replace_overwrites_previous_session() {
		let store = SessionStore::new();

		store.replace(session(1)).await;
		store.replace(session(2)).await;

		assert_eq!(store.current().await, Some(session(2)));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_replace_never_tears_a_session() {
		let store = Arc::new(SessionStore::new());

		let writers = (0..64).map(|n| {
			let store = Arc::clone(&store);
			tokio::spawn(async move {
				store.replace(session(n)).await;
				store.current().await
			})
		});

		for observed in futures::future::join_all(writers).await {
			let observed = observed.unwrap().unwrap();
			// token and user id always come from the same login
			assert_eq!(
				observed.user_id.trim_start_matches("user-"),
				observed.auth_token.trim_start_matches("token-")
			);
		}
	}
}
