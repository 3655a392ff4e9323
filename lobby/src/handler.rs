//! Request dispatch
//!
//! [`Lobby`] owns the registry and the external collaborators. Each
//! connection carries a [`Session`]; [`Lobby::handle`] turns one request into
//! exactly one response and never lets a domain error escape.

use crate::catalog::{Catalog, GameRef};
use crate::config::LobbyConfig;
use crate::error::LobbyError;
use crate::gateway::Gateway;
use crate::launcher::{find_free_port, LaunchRequest, MatchLauncher};
use crate::registry::{Registry, SessionId};
use crate::room::{RoomId, RoomStatus, Visibility};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;
use shared::{Request, Response, UserId};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Interface probed when searching for a match port
const PROBE_HOST: &str = "0.0.0.0";

/// Per-connection state
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub peer: SocketAddr,
    /// Account bound by a successful create or login
    pub user: Option<UserId>,
}

#[derive(Debug, Deserialize)]
struct CreateRoom {
    #[serde(alias = "host_user_id")]
    user_id: Option<UserId>,
    name: Option<String>,
    game_id: Option<u32>,
    #[serde(default)]
    visibility: Visibility,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListRooms {
    #[serde(alias = "only_available")]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoomRef {
    room_id: RoomId,
    #[serde(alias = "host_user_id")]
    user_id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
struct JoinRoom {
    room_id: RoomId,
    user_id: Option<UserId>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KickGuest {
    room_id: RoomId,
    #[serde(alias = "host_user_id")]
    user_id: Option<UserId>,
    #[serde(alias = "guest_id")]
    target_id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
struct CreateInvite {
    inviter_id: Option<UserId>,
    invitee_id: UserId,
    room_id: RoomId,
}

#[derive(Debug, Deserialize)]
struct RespondInvite {
    invitee_id: Option<UserId>,
    invite_id: u64,
    #[serde(default)]
    accept: bool,
}

#[derive(Debug, Default, Deserialize)]
struct UserRef {
    #[serde(alias = "id")]
    user_id: Option<UserId>,
}

pub struct Lobby<G, L> {
    registry: RwLock<Registry>,
    gateway: G,
    launcher: L,
    catalog: Catalog,
    config: LobbyConfig,
    /// Address match processes report results to
    report_addr: String,
    next_session: AtomicU64,
}

impl<G: Gateway, L: MatchLauncher> Lobby<G, L> {
    pub fn new(config: LobbyConfig, gateway: G, launcher: L, report_addr: String) -> Self {
        let catalog = Catalog::new(config.games.clone(), config.launch.clone());
        Self {
            registry: RwLock::new(Registry::new()),
            gateway,
            launcher,
            catalog,
            config,
            report_addr,
            next_session: AtomicU64::new(1),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn registry(&self) -> &RwLock<Registry> {
        &self.registry
    }

    pub fn open_session(&self, peer: SocketAddr) -> Session {
        Session {
            id: self.next_session.fetch_add(1, Ordering::Relaxed),
            peer,
            user: None,
        }
    }

    /// Resets stale logged-in flags left behind by a previous lobby run
    pub async fn init(&self) -> Result<(), LobbyError> {
        let response = self
            .gateway
            .request(&Request::new("Lobby", "init", json!({})))
            .await?;
        if !response.ok {
            warn!("Persistence init refused: {}", response.reason());
        }
        Ok(())
    }

    pub async fn handle(&self, session: &mut Session, request: Request) -> Response {
        debug!(
            "Session {} request {}/{}",
            session.id, request.collection, request.action
        );
        match self.dispatch(session, &request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(
                    "Session {} {}/{} failed: {}",
                    session.id, request.collection, request.action, e
                );
                Response::error(e.to_string())
            }
        }
    }

    /// Cleanup for a closed connection
    pub async fn disconnect(&self, session: &Session) {
        let Some(user) = session.user else {
            return;
        };

        let departure = self.registry.write().await.logout(user, session.id);
        let Some(departure) = departure else {
            return;
        };
        info!(
            "Session {} from {} closed, user {} removed ({:?})",
            session.id, session.peer, user, departure
        );

        let logout = Request::new("User", "logout", json!({"id": user}));
        match self.gateway.request(&logout).await {
            Ok(resp) if resp.ok => {}
            Ok(resp) => warn!("Persistence logout for user {} refused: {}", user, resp.reason()),
            Err(e) => warn!("Persistence logout for user {} failed: {}", user, e),
        }
    }

    /// The session's account, if the registry still binds it to this session
    async fn bound_user(&self, session: &Session) -> Option<UserId> {
        let user = session.user?;
        self.registry
            .read()
            .await
            .is_bound(user, session.id)
            .then_some(user)
    }

    async fn acting_user(
        &self,
        session: &Session,
        claimed: Option<UserId>,
    ) -> Result<UserId, LobbyError> {
        let user = self
            .bound_user(session)
            .await
            .ok_or(LobbyError::NotLoggedIn)?;
        match claimed {
            Some(claimed) if claimed != user => Err(LobbyError::IdentityMismatch),
            _ => Ok(user),
        }
    }

    async fn dispatch(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, LobbyError> {
        match (request.collection.as_str(), request.action.as_str()) {
            ("User", "create") | ("User", "login") => self.login(session, request).await,
            ("User", "logout") => self.logout(session, request).await,
            ("User", "list_online") => {
                self.acting_user(session, None).await?;
                let users = self.registry.read().await.list_online();
                Ok(Response::ok().with("users", users))
            }

            ("Room", "create") => self.create_room(session, request).await,
            ("Room", "list") => self.list_rooms(session, request).await,
            ("Room", "join") => {
                let data: JoinRoom = request.parse_data()?;
                let user = self.acting_user(session, data.user_id).await?;
                self.registry.write().await.join_room(
                    user,
                    data.room_id,
                    data.password.as_deref(),
                    false,
                )?;
                Ok(Response::ok().with("room_id", data.room_id))
            }
            ("Room", "leave") => {
                let data: RoomRef = request.parse_data()?;
                let user = self.acting_user(session, data.user_id).await?;
                self.registry.write().await.leave_room(user, data.room_id)?;
                Ok(Response::ok())
            }
            ("Room", "close") => {
                let data: RoomRef = request.parse_data()?;
                let host = self.acting_user(session, data.user_id).await?;
                let evicted = self.registry.write().await.close_room(host, data.room_id)?;
                Ok(Response::ok().with("evicted", evicted))
            }
            ("Room", "kick") => {
                let data: KickGuest = request.parse_data()?;
                let host = self.acting_user(session, data.user_id).await?;
                let kicked = self
                    .registry
                    .write()
                    .await
                    .kick(host, data.room_id, data.target_id)?;
                Ok(Response::ok().with("kicked", kicked))
            }
            ("Room", "ready") => {
                let data: RoomRef = request.parse_data()?;
                let host = self.acting_user(session, data.user_id).await?;
                self.registry.write().await.set_ready(host, data.room_id)?;
                Ok(Response::ok().with("status", RoomStatus::Ready.as_str()))
            }
            ("Room", "guest_ready") => {
                let data: RoomRef = request.parse_data()?;
                let user = self.acting_user(session, data.user_id).await?;
                let all_ready = self.registry.write().await.guest_ready(user, data.room_id)?;
                Ok(Response::ok().with("all_ready", all_ready))
            }
            ("Room", "status") => {
                self.acting_user(session, None).await?;
                let data: RoomRef = request.parse_data()?;
                let status = self.registry.read().await.room_status(data.room_id)?;
                let mut response = Response::ok().with("game_host", self.config.public_host.clone());
                if let serde_json::Value::Object(fields) = status {
                    response.fields.extend(fields);
                }
                Ok(response)
            }
            ("Room", "watch") => {
                self.acting_user(session, None).await?;
                let data: RoomRef = request.parse_data()?;
                let port = self.registry.read().await.watch(data.room_id)?;
                Ok(Response::ok()
                    .with("game_host", self.config.public_host.clone())
                    .with("game_port", port))
            }
            ("Room", "start_game") | ("Game", "start") => self.start_game(session, request).await,

            ("Invite", "create") => {
                let data: CreateInvite = request.parse_data()?;
                let inviter = self.acting_user(session, data.inviter_id).await?;
                let invite_id = self.registry.write().await.create_invite(
                    inviter,
                    data.invitee_id,
                    data.room_id,
                )?;
                Ok(Response::ok().with("invite_id", invite_id))
            }
            ("Invite", "list") => {
                let data: UserRef = request.parse_data()?;
                let user = self.acting_user(session, data.user_id).await?;
                let invites = self.registry.read().await.list_invites(user);
                Ok(Response::ok().with("invites", invites))
            }
            ("Invite", "respond") => {
                let data: RespondInvite = request.parse_data()?;
                let user = self.acting_user(session, data.invitee_id).await?;
                let joined = self
                    .registry
                    .write()
                    .await
                    .respond_invite(user, data.invite_id, data.accept)?;
                Ok(Response::ok().with("room_id", joined))
            }

            ("Game", "report") => Ok(self.forward_report(request).await),

            ("games", "game_list") => Ok(Response::ok().with("games", self.catalog.list_json())),
            ("games", "get_version") => {
                let data: GameRef = request.parse_data()?;
                self.catalog.version(data.game_id)
            }
            ("games", "id_to_name") => {
                let data: GameRef = request.parse_data()?;
                self.catalog.name(data.game_id)
            }
            ("games", "download_game") => {
                let data: GameRef = request.parse_data()?;
                self.catalog.download(data.game_id).await
            }

            (collection, action) => Err(LobbyError::UnknownAction(
                collection.to_string(),
                action.to_string(),
            )),
        }
    }

    async fn login(&self, session: &mut Session, request: &Request) -> Result<Response, LobbyError> {
        if self.bound_user(session).await.is_some() {
            return Err(LobbyError::AlreadyLoggedIn);
        }

        let response = self.gateway.request(request).await?;
        if !response.ok {
            // Credential failures are surfaced as the persistence service words them
            return Ok(Response::error(response.reason()));
        }

        let id = response.get_u64("id").ok_or(LobbyError::MalformedUpstream)?;
        let name = response
            .get_str("name")
            .or_else(|| request.data.get("name").and_then(|n| n.as_str()))
            .unwrap_or_default()
            .to_string();

        self.registry.write().await.login(id, name.clone(), session.id);
        session.user = Some(id);
        info!("Session {} from {} is now {} ({})", session.id, session.peer, name, id);
        Ok(Response::ok().with("id", id).with("name", name))
    }

    async fn logout(&self, session: &mut Session, request: &Request) -> Result<Response, LobbyError> {
        let data: UserRef = request.parse_data().unwrap_or_default();
        let user = self.acting_user(session, data.user_id).await?;

        // Local state is only dropped once persistence has cleared its flag
        let response = self
            .gateway
            .request(&Request::new("User", "logout", json!({"id": user})))
            .await?;
        if !response.ok {
            warn!("Persistence logout for user {} refused: {}", user, response.reason());
            return Ok(Response::error(response.reason()));
        }

        self.registry.write().await.logout(user, session.id);
        session.user = None;
        Ok(Response::ok().with("id", user))
    }

    async fn create_room(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, LobbyError> {
        let data: CreateRoom = request.parse_data()?;
        let host = self.acting_user(session, data.user_id).await?;
        let game = match data.game_id {
            Some(id) => self.catalog.get(id)?,
            None => self.catalog.default_game().ok_or(LobbyError::UnknownGame(0))?,
        };

        let room_id = self.registry.write().await.create_room(
            host,
            data.name,
            game,
            data.visibility,
            data.password,
        )?;
        Ok(Response::ok()
            .with("room_id", room_id)
            .with("game_id", game.id))
    }

    async fn list_rooms(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, LobbyError> {
        self.acting_user(session, None).await?;
        let data: ListRooms = request.parse_data()?;
        let status = match data.status.as_deref() {
            None => Some(RoomStatus::Space),
            Some("all") => None,
            Some(s) => Some(s.parse::<RoomStatus>()?),
        };
        let rooms = self.registry.read().await.list_rooms(status);
        Ok(Response::ok().with("rooms", rooms))
    }

    /// Probes a port without holding the registry, then re-validates and
    /// commits under one write guard
    async fn start_game(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, LobbyError> {
        let data: RoomRef = request.parse_data()?;
        let host = self.acting_user(session, data.user_id).await?;
        let room_id = data.room_id;

        let game_id = self.registry.read().await.check_start(host, room_id)?;
        let descriptor = self.catalog.launch_descriptor(game_id)?.clone();
        let range = &self.config.port_range;
        let port = find_free_port(PROBE_HOST, range.start, range.end).await?;

        let mut registry = self.registry.write().await;
        let game_id = registry.check_start(host, room_id)?;
        self.launcher.launch(&LaunchRequest {
            port,
            room_id,
            game_id,
            descriptor,
            lobby_addr: self.report_addr.clone(),
        })?;
        registry.mark_playing(room_id, port)?;
        drop(registry);

        Ok(Response::ok()
            .with("room_id", room_id)
            .with("game_host", self.config.public_host.clone())
            .with("game_port", port))
    }

    /// The match engine is trusted: the report is stored as sent and always acknowledged
    async fn forward_report(&self, request: &Request) -> Response {
        let room = request.data.get("room_id").cloned().unwrap_or_default();
        let winner = request.data.get("winner").cloned().unwrap_or_default();
        info!("Room {} finished, winner {}", room, winner);

        match self.gateway.request(request).await {
            Ok(resp) if resp.ok => debug!("Report for room {} stored", room),
            Ok(resp) => warn!("Report for room {} refused: {}", room, resp.reason()),
            Err(e) => warn!("Report for room {} not stored: {}", room, e),
        }
        Response::ok()
    }
}
