//! Room lifecycle
//!
//! A room moves `space -> full -> ready -> play`. Guests joining or leaving
//! move it between `space` and `full`; `ready` opens one flag per guest and
//! `play` is final until the host closes the room.

use crate::error::LobbyError;
use serde::{Deserialize, Serialize};
use shared::UserId;
use std::collections::BTreeMap;
use std::str::FromStr;

pub type RoomId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Space,
    Full,
    Ready,
    Play,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Space => "space",
            RoomStatus::Full => "full",
            RoomStatus::Ready => "ready",
            RoomStatus::Play => "play",
        }
    }
}

impl FromStr for RoomStatus {
    type Err = LobbyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "space" => Ok(RoomStatus::Space),
            "full" => Ok(RoomStatus::Full),
            "ready" => Ok(RoomStatus::Ready),
            "play" => Ok(RoomStatus::Play),
            other => Err(LobbyError::BadRequest(format!("unknown room status {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub host: UserId,
    /// Guests in join order
    pub guests: Vec<UserId>,
    pub game_id: u32,
    /// Maximum occupants, host included
    pub capacity: usize,
    pub visibility: Visibility,
    password: Option<String>,
    pub status: RoomStatus,
    pub game_port: Option<u16>,
    ready: BTreeMap<UserId, bool>,
}

impl Room {
    pub fn new(
        id: RoomId,
        name: String,
        host: UserId,
        game_id: u32,
        capacity: usize,
        visibility: Visibility,
        password: Option<String>,
    ) -> Self {
        Self {
            id,
            name,
            host,
            guests: Vec::new(),
            game_id,
            capacity: capacity.max(1),
            visibility,
            password: password.filter(|_| visibility == Visibility::Private),
            status: RoomStatus::Space,
            game_port: None,
            ready: BTreeMap::new(),
        }
    }

    pub fn is_host(&self, user: UserId) -> bool {
        self.host == user
    }

    pub fn has_guest(&self, user: UserId) -> bool {
        self.guests.contains(&user)
    }

    /// Host first, then guests in join order
    pub fn occupants(&self) -> impl Iterator<Item = UserId> + '_ {
        std::iter::once(self.host).chain(self.guests.iter().copied())
    }

    pub fn occupant_count(&self) -> usize {
        1 + self.guests.len()
    }

    pub fn check_password(&self, given: Option<&str>) -> Result<(), LobbyError> {
        if self.visibility == Visibility::Public {
            return Ok(());
        }
        match (given, self.password.as_deref()) {
            (None, _) => Err(LobbyError::PasswordRequired),
            (Some(given), Some(expected)) if given == expected => Ok(()),
            // A private room created without a password accepts anything
            (Some(_), None) => Ok(()),
            (Some(_), Some(_)) => Err(LobbyError::WrongPassword),
        }
    }

    /// Appends a guest; reaching capacity moves the room to `full`, not to `ready`
    pub fn add_guest(&mut self, user: UserId) -> Result<(), LobbyError> {
        match self.status {
            RoomStatus::Full => return Err(LobbyError::RoomFull),
            RoomStatus::Ready => return Err(LobbyError::RoomStarting),
            RoomStatus::Play => return Err(LobbyError::AlreadyPlaying),
            RoomStatus::Space => {}
        }
        if self.occupant_count() >= self.capacity {
            return Err(LobbyError::RoomFull);
        }

        self.guests.push(user);
        if self.occupant_count() >= self.capacity {
            self.status = RoomStatus::Full;
        }
        Ok(())
    }

    /// Drops a guest; before play the room goes back to `space`
    pub fn remove_guest(&mut self, user: UserId) -> Result<(), LobbyError> {
        let index = self
            .guests
            .iter()
            .position(|g| *g == user)
            .ok_or(LobbyError::NotInRoom)?;
        self.guests.remove(index);

        if self.status != RoomStatus::Play {
            self.status = RoomStatus::Space;
            self.ready.clear();
        }
        Ok(())
    }

    /// Host transition to `ready`, one cleared flag per current guest
    pub fn mark_ready(&mut self) -> Result<(), LobbyError> {
        match self.status {
            RoomStatus::Ready => return Err(LobbyError::AlreadyReady),
            RoomStatus::Play => return Err(LobbyError::AlreadyPlaying),
            RoomStatus::Space | RoomStatus::Full => {}
        }
        if self.guests.is_empty() {
            return Err(LobbyError::NoGuests);
        }

        self.ready = self.guests.iter().map(|g| (*g, false)).collect();
        self.status = RoomStatus::Ready;
        Ok(())
    }

    pub fn guest_ready(&mut self, user: UserId) -> Result<(), LobbyError> {
        if self.status != RoomStatus::Ready {
            return Err(LobbyError::NotReady);
        }
        let flag = self.ready.get_mut(&user).ok_or(LobbyError::NotInRoom)?;
        *flag = true;
        Ok(())
    }

    pub fn is_guest_ready(&self, user: UserId) -> bool {
        self.ready.get(&user).copied().unwrap_or(false)
    }

    pub fn all_ready(&self) -> bool {
        !self.ready.is_empty() && self.ready.values().all(|r| *r)
    }

    /// Everything `start_game` needs, without changing anything
    pub fn check_startable(&self) -> Result<(), LobbyError> {
        match self.status {
            RoomStatus::Play => Err(LobbyError::AlreadyPlaying),
            RoomStatus::Space | RoomStatus::Full => Err(LobbyError::NotReady),
            RoomStatus::Ready if !self.all_ready() => Err(LobbyError::GuestsNotReady),
            RoomStatus::Ready => Ok(()),
        }
    }

    pub fn mark_playing(&mut self, port: u16) -> Result<(), LobbyError> {
        self.check_startable()?;
        self.status = RoomStatus::Play;
        self.game_port = Some(port);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(capacity: usize) -> Room {
        Room::new(0, "R1".to_string(), 1, 3, capacity, Visibility::Public, None)
    }

    #[test]
    fn test_join_reaching_capacity_marks_full_not_ready() {
        let mut room = room(3);
        room.add_guest(2).unwrap();
        assert_eq!(room.status, RoomStatus::Space);
        room.add_guest(3).unwrap();
        assert_eq!(room.status, RoomStatus::Full);

        assert!(matches!(room.add_guest(4), Err(LobbyError::RoomFull)));
        assert_eq!(room.occupants().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_ready_flow() {
        let mut room = room(2);
        assert!(matches!(room.mark_ready(), Err(LobbyError::NoGuests)));

        room.add_guest(2).unwrap();
        room.mark_ready().unwrap();
        assert_eq!(room.status, RoomStatus::Ready);
        assert!(!room.all_ready());
        assert!(matches!(room.check_startable(), Err(LobbyError::GuestsNotReady)));

        room.guest_ready(2).unwrap();
        assert!(room.all_ready());
        room.mark_playing(16800).unwrap();
        assert_eq!(room.status, RoomStatus::Play);
        assert_eq!(room.game_port, Some(16800));
    }

    #[test]
    fn test_guest_ready_requires_ready_status() {
        let mut room = room(2);
        room.add_guest(2).unwrap();
        assert!(matches!(room.guest_ready(2), Err(LobbyError::NotReady)));
    }

    #[test]
    fn test_stranger_cannot_flag_ready() {
        let mut room = room(3);
        room.add_guest(2).unwrap();
        room.mark_ready().unwrap();
        assert!(matches!(room.guest_ready(9), Err(LobbyError::NotInRoom)));
    }

    #[test]
    fn test_no_join_once_ready_or_playing() {
        let mut room = room(3);
        room.add_guest(2).unwrap();
        room.mark_ready().unwrap();
        assert!(matches!(room.add_guest(3), Err(LobbyError::RoomStarting)));

        room.guest_ready(2).unwrap();
        room.mark_playing(1).unwrap();
        assert!(matches!(room.add_guest(3), Err(LobbyError::AlreadyPlaying)));
    }

    #[test]
    fn test_leave_reverts_to_space() {
        let mut room = room(2);
        room.add_guest(2).unwrap();
        room.mark_ready().unwrap();
        room.guest_ready(2).unwrap();

        room.remove_guest(2).unwrap();
        assert_eq!(room.status, RoomStatus::Space);
        assert!(!room.all_ready());
        assert!(matches!(room.remove_guest(2), Err(LobbyError::NotInRoom)));
    }

    #[test]
    fn test_leave_during_play_keeps_status() {
        let mut room = room(2);
        room.add_guest(2).unwrap();
        room.mark_ready().unwrap();
        room.guest_ready(2).unwrap();
        room.mark_playing(5).unwrap();

        room.remove_guest(2).unwrap();
        assert_eq!(room.status, RoomStatus::Play);
    }

    #[test]
    fn test_private_room_password() {
        let room = Room::new(
            0,
            "secret".to_string(),
            1,
            3,
            2,
            Visibility::Private,
            Some("hunter2".to_string()),
        );
        assert!(matches!(room.check_password(None), Err(LobbyError::PasswordRequired)));
        assert!(matches!(
            room.check_password(Some("nope")),
            Err(LobbyError::WrongPassword)
        ));
        assert!(room.check_password(Some("hunter2")).is_ok());
    }

    #[test]
    fn test_public_room_ignores_password() {
        let room = Room::new(0, "open".to_string(), 1, 3, 2, Visibility::Public, Some("x".into()));
        assert!(room.check_password(None).is_ok());
    }

    #[test]
    fn test_status_strings() {
        for status in [RoomStatus::Space, RoomStatus::Full, RoomStatus::Ready, RoomStatus::Play] {
            assert_eq!(status.as_str().parse::<RoomStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::json!(status.as_str())
            );
        }
        assert!("lobby".parse::<RoomStatus>().is_err());
    }
}
