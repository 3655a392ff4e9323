//! Client side of the persistence service
//!
//! The lobby never stores accounts or results itself. [`RemoteGateway`] keeps
//! one framed TCP connection to the persistence process and serializes every
//! exchange on it; [`MemoryGateway`] answers the same requests in-process for
//! development and tests.

use log::{debug, warn};
use serde_json::{json, Value};
use shared::{read_frame, write_frame, FrameError, Request, Response, UserId};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("cannot reach persistence service at {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error("persistence link failed: {0}")]
    Frame(#[from] FrameError),
    #[error("persistence service did not answer within {0:?}")]
    Timeout(Duration),
}

/// Request/response access to the persistence service
pub trait Gateway: Send + Sync + 'static {
    fn request(
        &self,
        request: &Request,
    ) -> impl Future<Output = Result<Response, GatewayError>> + Send;
}

/// Framed TCP link to the persistence process
///
/// The link is opened lazily and reopened after any failure. The mutex is
/// held across "send, await response" so two sessions can never read each
/// other's answers.
pub struct RemoteGateway {
    addr: String,
    conn: Mutex<Option<TcpStream>>,
    timeout: Duration,
}

impl RemoteGateway {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            conn: Mutex::new(None),
            timeout,
        }
    }

    async fn connect(&self) -> Result<TcpStream, GatewayError> {
        let connect = TcpStream::connect(&self.addr);
        match timeout(self.timeout, connect).await {
            Ok(Ok(stream)) => {
                debug!("Connected to persistence service at {}", self.addr);
                Ok(stream)
            }
            Ok(Err(source)) => Err(GatewayError::Connect {
                addr: self.addr.clone(),
                source,
            }),
            Err(_) => Err(GatewayError::Timeout(self.timeout)),
        }
    }
}

async fn exchange(stream: &mut TcpStream, request: &Request) -> Result<Response, FrameError> {
    write_frame(stream, request).await?;
    read_frame(stream).await
}

impl Gateway for RemoteGateway {
    async fn request(&self, request: &Request) -> Result<Response, GatewayError> {
        let mut conn = self.conn.lock().await;
        let mut stream = match conn.take() {
            Some(stream) => stream,
            None => self.connect().await?,
        };

        // On any failure the stream is dropped and the next request reconnects
        let response = match timeout(self.timeout, exchange(&mut stream, request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("Persistence request {}/{} failed: {}", request.collection, request.action, e);
                return Err(e.into());
            }
            Err(_) => return Err(GatewayError::Timeout(self.timeout)),
        };

        *conn = Some(stream);
        Ok(response)
    }
}

#[derive(Debug, Clone)]
struct Account {
    id: UserId,
    name: String,
    password: String,
    online: bool,
}

#[derive(Debug, Default)]
struct Store {
    accounts: HashMap<String, Account>,
    next_id: UserId,
    reports: Vec<Value>,
}

impl Store {
    fn account_mut(&mut self, id: UserId) -> Option<&mut Account> {
        self.accounts.values_mut().find(|a| a.id == id)
    }
}

/// In-process stand-in for the persistence service
///
/// Answers with the same reasons and fields as the real service, which makes
/// it usable both for `--memory-gateway` runs and as a test double.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    store: Mutex<Store>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result reports received so far, oldest first
    pub async fn reports(&self) -> Vec<Value> {
        self.store.lock().await.reports.clone()
    }

    pub async fn is_online(&self, id: UserId) -> bool {
        let mut store = self.store.lock().await;
        store.account_mut(id).is_some_and(|a| a.online)
    }

    fn credentials(data: &Value) -> Option<(String, String)> {
        let name = data.get("name")?.as_str()?.to_string();
        let password = data.get("password")?.as_str()?.to_string();
        Some((name, password))
    }

    fn handle(store: &mut Store, request: &Request) -> Response {
        match (request.collection.as_str(), request.action.as_str()) {
            ("Lobby", "init") => {
                for account in store.accounts.values_mut() {
                    account.online = false;
                }
                Response::ok().with("msg", "All users reset to offline.")
            }
            ("User", "create") => {
                let Some((name, password)) = Self::credentials(&request.data) else {
                    return Response::error("Missing field: name/password");
                };
                if store.accounts.contains_key(&name) {
                    return Response::error(format!("Username '{}' already exists.", name));
                }
                store.next_id += 1;
                let id = store.next_id;
                store.accounts.insert(
                    name.clone(),
                    Account {
                        id,
                        name: name.clone(),
                        password,
                        online: true,
                    },
                );
                Response::ok().with("id", id).with("name", name)
            }
            ("User", "login") => {
                let Some((name, password)) = Self::credentials(&request.data) else {
                    return Response::error("Missing field: name/password");
                };
                let Some(account) = store.accounts.get_mut(&name) else {
                    return Response::error("User not found.");
                };
                if account.password != password {
                    return Response::error("Invalid password.");
                }
                if account.online {
                    return Response::error("User already logged in elsewhere.");
                }
                account.online = true;
                Response::ok().with("id", account.id).with("name", account.name.clone())
            }
            ("User", "logout") => {
                let Some(id) = request.data.get("id").and_then(Value::as_u64) else {
                    return Response::error("Missing field: id");
                };
                match store.account_mut(id) {
                    Some(account) => {
                        account.online = false;
                        Response::ok().with("id", id).with("name", account.name.clone())
                    }
                    None => Response::error("User not found."),
                }
            }
            ("User", "list_online") => {
                let mut users: Vec<&Account> =
                    store.accounts.values().filter(|a| a.online).collect();
                users.sort_by_key(|a| a.id);
                let users: Vec<Value> = users
                    .into_iter()
                    .map(|a| json!({"id": a.id, "name": a.name}))
                    .collect();
                Response::ok().with("users", users)
            }
            ("Game", "report") => {
                store.reports.push(request.data.clone());
                Response::ok().with("count", store.reports.len())
            }
            (collection, action) => Response::error(format!(
                "Unknown collection/action: {}/{}",
                collection, action
            )),
        }
    }
}

impl Gateway for MemoryGateway {
    async fn request(&self, request: &Request) -> Result<Response, GatewayError> {
        let mut store = self.store.lock().await;
        Ok(Self::handle(&mut store, request))
    }
}
