//! In-memory presence, room and invite registry
//!
//! Every method here is one complete transaction: it validates, then mutates,
//! and never awaits. Callers hold the registry's write guard for the duration
//! of a call and release it before doing any I/O.

use crate::config::GameInfo;
use crate::error::LobbyError;
use crate::room::{Room, RoomId, RoomStatus, Visibility};
use log::info;
use serde_json::{json, Value};
use shared::UserId;
use std::collections::{BTreeMap, HashMap};

/// Identifies one accepted lobby connection
pub type SessionId = u64;

#[derive(Debug, Clone)]
pub struct OnlineUser {
    pub id: UserId,
    pub name: String,
    pub session: SessionId,
    pub room: Option<RoomId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub id: u64,
    pub room_id: RoomId,
    pub inviter: UserId,
    pub invitee: UserId,
}

/// Outcome of tearing a user out of the registry
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Departure {
    pub closed_room: Option<RoomId>,
    pub left_room: Option<RoomId>,
    pub dropped_invites: usize,
}

#[derive(Debug, Default)]
pub struct Registry {
    users: HashMap<UserId, OnlineUser>,
    rooms: BTreeMap<RoomId, Room>,
    /// Pending invites keyed by invitee, oldest first
    invites: HashMap<UserId, Vec<Invite>>,
    next_room_id: RoomId,
    next_invite_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self, id: UserId) -> Option<&OnlineUser> {
        self.users.get(&id)
    }

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    fn online(&self, id: UserId) -> Result<&OnlineUser, LobbyError> {
        self.users.get(&id).ok_or(LobbyError::UserNotOnline(id))
    }

    fn room_mut(&mut self, id: RoomId) -> Result<&mut Room, LobbyError> {
        self.rooms.get_mut(&id).ok_or(LobbyError::RoomNotFound(id))
    }

    fn hosted_room_mut(&mut self, host: UserId, id: RoomId) -> Result<&mut Room, LobbyError> {
        let room = self.room_mut(id)?;
        if !room.is_host(host) {
            return Err(LobbyError::NotHost);
        }
        Ok(room)
    }

    fn display_name(&self, id: UserId) -> String {
        self.users
            .get(&id)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| format!("user {}", id))
    }

    /// Binds an account to a session; a newer login replaces the old binding
    pub fn login(&mut self, id: UserId, name: String, session: SessionId) {
        let room = self.users.get(&id).and_then(|u| u.room);
        info!("User {} ({}) online on session {}", name, id, session);
        self.users.insert(
            id,
            OnlineUser {
                id,
                name,
                session,
                room,
            },
        );
    }

    /// True while `session` holds the user's current binding
    pub fn is_bound(&self, id: UserId, session: SessionId) -> bool {
        self.users.get(&id).is_some_and(|u| u.session == session)
    }

    /// Removes a user bound to `session` along with everything they own
    ///
    /// A hosted room is closed, a guest seat is given up and invites to or
    /// from the user are discarded. Returns `None` if the user was not bound
    /// to that session.
    pub fn logout(&mut self, id: UserId, session: SessionId) -> Option<Departure> {
        if self.users.get(&id)?.session != session {
            return None;
        }

        let mut departure = Departure::default();
        if let Some(room_id) = self.users.get(&id).and_then(|u| u.room) {
            let hosts = self.rooms.get(&room_id).is_some_and(|r| r.is_host(id));
            if hosts {
                if self.close_room(id, room_id).is_ok() {
                    departure.closed_room = Some(room_id);
                }
            } else if self.leave_room(id, room_id).is_ok() {
                departure.left_room = Some(room_id);
            }
        }

        departure.dropped_invites = self.drop_invites_involving(id);
        self.users.remove(&id);
        info!("User {} offline", id);
        Some(departure)
    }

    fn drop_invites_involving(&mut self, id: UserId) -> usize {
        let mut dropped = self.invites.remove(&id).map_or(0, |q| q.len());
        for queue in self.invites.values_mut() {
            let before = queue.len();
            queue.retain(|inv| inv.inviter != id);
            dropped += before - queue.len();
        }
        self.invites.retain(|_, queue| !queue.is_empty());
        dropped
    }

    pub fn list_online(&self) -> Vec<Value> {
        let mut users: Vec<&OnlineUser> = self.users.values().collect();
        users.sort_by_key(|u| u.id);
        users
            .into_iter()
            .map(|u| json!({"id": u.id, "name": u.name, "room_id": u.room}))
            .collect()
    }

    pub fn create_room(
        &mut self,
        host: UserId,
        name: Option<String>,
        game: &GameInfo,
        visibility: Visibility,
        password: Option<String>,
    ) -> Result<RoomId, LobbyError> {
        if self.online(host)?.room.is_some() {
            return Err(LobbyError::AlreadyInRoom);
        }

        let id = self.next_room_id;
        self.next_room_id += 1;
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Room_{}", id));

        let room = Room::new(
            id,
            name,
            host,
            game.id,
            game.max_players,
            visibility,
            password,
        );
        info!(
            "User {} created room {} '{}' for game {} ({:?})",
            host, id, room.name, game.id, visibility
        );
        self.rooms.insert(id, room);
        if let Some(user) = self.users.get_mut(&host) {
            user.room = Some(id);
        }
        Ok(id)
    }

    /// Rooms whose host is online, optionally only those in `status`
    pub fn list_rooms(&self, status: Option<RoomStatus>) -> Vec<Value> {
        self.rooms
            .values()
            .filter(|r| self.users.contains_key(&r.host))
            .filter(|r| status.map_or(true, |s| r.status == s))
            .map(|r| {
                json!({
                    "id": r.id,
                    "name": r.name,
                    "host": self.display_name(r.host),
                    "host_id": r.host,
                    "game_id": r.game_id,
                    "visibility": r.visibility,
                    "status": r.status,
                    "players": r.occupant_count(),
                    "capacity": r.capacity,
                })
            })
            .collect()
    }

    /// Adds `user` as a guest; invitations skip the password check
    pub fn join_room(
        &mut self,
        user: UserId,
        room_id: RoomId,
        password: Option<&str>,
        invited: bool,
    ) -> Result<(), LobbyError> {
        if self.online(user)?.room.is_some() {
            return Err(LobbyError::AlreadyInRoom);
        }

        let room = self.room_mut(room_id)?;
        if !invited {
            room.check_password(password)?;
        }
        room.add_guest(user)?;
        let status = room.status;

        if let Some(u) = self.users.get_mut(&user) {
            u.room = Some(room_id);
        }
        info!("User {} joined room {} (now {:?})", user, room_id, status);
        Ok(())
    }

    pub fn leave_room(&mut self, user: UserId, room_id: RoomId) -> Result<(), LobbyError> {
        let room = self.room_mut(room_id)?;
        if room.is_host(user) {
            return Err(LobbyError::HostCannotLeave);
        }
        room.remove_guest(user)?;

        if let Some(u) = self.users.get_mut(&user) {
            u.room = None;
        }
        info!("User {} left room {}", user, room_id);
        Ok(())
    }

    /// Host removes a guest, the first one when none is named
    pub fn kick(
        &mut self,
        host: UserId,
        room_id: RoomId,
        guest: Option<UserId>,
    ) -> Result<UserId, LobbyError> {
        let room = self.hosted_room_mut(host, room_id)?;
        let guest = match guest {
            Some(g) => g,
            None => *room.guests.first().ok_or(LobbyError::NoGuests)?,
        };
        room.remove_guest(guest)?;

        if let Some(u) = self.users.get_mut(&guest) {
            u.room = None;
        }
        info!("Host {} kicked user {} from room {}", host, guest, room_id);
        Ok(guest)
    }

    /// Host deletes the room, evicting every occupant; returns who was evicted
    pub fn close_room(&mut self, host: UserId, room_id: RoomId) -> Result<Vec<UserId>, LobbyError> {
        self.hosted_room_mut(host, room_id)?;
        let room = self
            .rooms
            .remove(&room_id)
            .ok_or(LobbyError::RoomNotFound(room_id))?;

        let evicted: Vec<UserId> = room.occupants().collect();
        for id in &evicted {
            if let Some(u) = self.users.get_mut(id) {
                if u.room == Some(room_id) {
                    u.room = None;
                }
            }
        }
        for queue in self.invites.values_mut() {
            queue.retain(|inv| inv.room_id != room_id);
        }
        self.invites.retain(|_, queue| !queue.is_empty());

        info!("Room {} closed by host {}", room_id, host);
        Ok(evicted)
    }

    pub fn set_ready(&mut self, host: UserId, room_id: RoomId) -> Result<(), LobbyError> {
        self.hosted_room_mut(host, room_id)?.mark_ready()?;
        info!("Room {} is ready", room_id);
        Ok(())
    }

    /// Sets the guest's flag and returns the room's `all_ready`
    pub fn guest_ready(&mut self, user: UserId, room_id: RoomId) -> Result<bool, LobbyError> {
        let room = self.room_mut(room_id)?;
        room.guest_ready(user)?;
        Ok(room.all_ready())
    }

    /// Validates a host's start request; returns the room's game id
    pub fn check_start(&self, host: UserId, room_id: RoomId) -> Result<u32, LobbyError> {
        let room = self
            .rooms
            .get(&room_id)
            .ok_or(LobbyError::RoomNotFound(room_id))?;
        if !room.is_host(host) {
            return Err(LobbyError::NotHost);
        }
        room.check_startable()?;
        Ok(room.game_id)
    }

    pub fn mark_playing(&mut self, room_id: RoomId, port: u16) -> Result<(), LobbyError> {
        self.room_mut(room_id)?.mark_playing(port)?;
        info!("Room {} is playing on port {}", room_id, port);
        Ok(())
    }

    pub fn room_status(&self, room_id: RoomId) -> Result<Value, LobbyError> {
        let room = self
            .rooms
            .get(&room_id)
            .ok_or(LobbyError::RoomNotFound(room_id))?;

        let guests: Vec<Value> = room
            .guests
            .iter()
            .map(|g| json!({"id": g, "name": self.display_name(*g), "ready": room.is_guest_ready(*g)}))
            .collect();

        Ok(json!({
            "room_id": room.id,
            "name": room.name,
            "status": room.status,
            "game_id": room.game_id,
            "host": {"id": room.host, "name": self.display_name(room.host)},
            "guest_joined": !room.guests.is_empty(),
            "guests": guests,
            "all_ready": room.all_ready(),
            "capacity": room.capacity,
            "game_port": room.game_port,
        }))
    }

    /// Port of a running match, for observers
    pub fn watch(&self, room_id: RoomId) -> Result<u16, LobbyError> {
        let room = self
            .rooms
            .get(&room_id)
            .ok_or(LobbyError::RoomNotFound(room_id))?;
        match (room.status, room.game_port) {
            (RoomStatus::Play, Some(port)) => Ok(port),
            _ => Err(LobbyError::NotPlaying),
        }
    }

    pub fn create_invite(
        &mut self,
        inviter: UserId,
        invitee: UserId,
        room_id: RoomId,
    ) -> Result<u64, LobbyError> {
        if inviter == invitee {
            return Err(LobbyError::SelfInvite);
        }
        self.online(inviter)?;
        self.online(invitee)?;
        let room = self
            .rooms
            .get(&room_id)
            .ok_or(LobbyError::RoomNotFound(room_id))?;
        if !room.occupants().any(|id| id == inviter) {
            return Err(LobbyError::NotInRoom);
        }

        let id = self.next_invite_id;
        self.next_invite_id += 1;
        self.invites.entry(invitee).or_default().push(Invite {
            id,
            room_id,
            inviter,
            invitee,
        });
        info!(
            "User {} invited {} to room {} (invite {})",
            inviter, invitee, room_id, id
        );
        Ok(id)
    }

    pub fn list_invites(&self, invitee: UserId) -> Vec<Value> {
        self.invites
            .get(&invitee)
            .map(|queue| {
                queue
                    .iter()
                    .map(|inv| {
                        json!({
                            "invite_id": inv.id,
                            "from_id": inv.inviter,
                            "from_name": self.display_name(inv.inviter),
                            "room_id": inv.room_id,
                            "room_name": self.rooms.get(&inv.room_id).map(|r| r.name.clone()),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Consumes an invite; accepting runs the regular join minus the password
    pub fn respond_invite(
        &mut self,
        invitee: UserId,
        invite_id: u64,
        accept: bool,
    ) -> Result<Option<RoomId>, LobbyError> {
        let queue = self
            .invites
            .get_mut(&invitee)
            .ok_or(LobbyError::InviteNotFound(invite_id))?;
        let index = queue
            .iter()
            .position(|inv| inv.id == invite_id)
            .ok_or(LobbyError::InviteNotFound(invite_id))?;
        let invite = queue.remove(index);
        if queue.is_empty() {
            self.invites.remove(&invitee);
        }

        if !accept {
            info!("User {} declined invite {}", invitee, invite_id);
            return Ok(None);
        }
        self.join_room(invitee, invite.room_id, None, true)?;
        Ok(Some(invite.room_id))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn online_count(&self) -> usize {
        self.users.len()
    }
}
