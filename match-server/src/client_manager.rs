//! Connection bookkeeping for a match server
//!
//! Every accepted connection is either one of the two seats or an observer.
//! Each connection owns a bounded outbox drained by its writer task, so a slow
//! peer can never stall the simulation loop:
//! - Seats are claimed in order on accept while the match is still forming
//! - Observers attach at any time and only ever receive
//! - A full or closed observer outbox drops that observer on the spot

use log::{debug, info, warn};
use shared::SeatId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Number of seats in a match
pub const SEAT_COUNT: SeatId = 2;

/// Pre-encoded frame shared by every recipient of a broadcast
pub type Frame = Arc<Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Seat(SeatId),
    Observer(u32),
}

#[derive(Debug)]
pub struct Connection {
    pub id: u32,
    pub addr: SocketAddr,
    pub role: Role,
    /// Set once the seat has introduced itself with `hello`
    pub identified: bool,
    outbox: mpsc::Sender<Frame>,
}

impl Connection {
    /// Queues a frame without waiting for the writer
    fn push(&self, frame: &Frame) -> Result<(), TrySendError<Frame>> {
        self.outbox.try_send(Arc::clone(frame))
    }
}

pub struct ClientManager {
    connections: HashMap<u32, Connection>,
    next_conn_id: u32,
    next_observer_id: u32,
    /// Seats stop being handed out once the match has been announced
    seats_open: bool,
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_conn_id: 1,
            next_observer_id: 1,
            seats_open: true,
        }
    }

    fn free_seat(&self) -> Option<SeatId> {
        (1..=SEAT_COUNT).find(|seat| self.seat_conn_id(*seat).is_none())
    }

    /// Registers a connection, giving it the lowest free seat if any
    pub fn add_connection(&mut self, addr: SocketAddr, outbox: mpsc::Sender<Frame>) -> (u32, Role) {
        let id = self.next_conn_id;
        self.next_conn_id += 1;

        let role = match self.free_seat().filter(|_| self.seats_open) {
            Some(seat) => {
                info!("Connection {} from {} took seat {}", id, addr, seat);
                Role::Seat(seat)
            }
            None => {
                let observer = self.next_observer_id;
                self.next_observer_id += 1;
                info!("Connection {} from {} is observer {}", id, addr, observer);
                Role::Observer(observer)
            }
        };

        self.connections.insert(
            id,
            Connection {
                id,
                addr,
                role,
                identified: false,
                outbox,
            },
        );
        (id, role)
    }

    pub fn remove_connection(&mut self, conn_id: u32) -> Option<Connection> {
        let removed = self.connections.remove(&conn_id);
        if let Some(conn) = &removed {
            info!("Connection {} ({:?}) closed", conn.id, conn.role);
        }
        removed
    }

    pub fn get(&self, conn_id: u32) -> Option<&Connection> {
        self.connections.get(&conn_id)
    }

    pub fn role_of(&self, conn_id: u32) -> Option<Role> {
        self.connections.get(&conn_id).map(|c| c.role)
    }

    pub fn seat_conn_id(&self, seat: SeatId) -> Option<u32> {
        self.connections
            .values()
            .find(|c| c.role == Role::Seat(seat))
            .map(|c| c.id)
    }

    pub fn mark_identified(&mut self, conn_id: u32) {
        if let Some(conn) = self.connections.get_mut(&conn_id) {
            conn.identified = true;
        }
    }

    /// True once both seats are taken and have sent `hello`
    pub fn seats_ready(&self) -> bool {
        (1..=SEAT_COUNT).all(|seat| {
            self.connections
                .values()
                .any(|c| c.role == Role::Seat(seat) && c.identified)
        })
    }

    pub fn close_seats(&mut self) {
        self.seats_open = false;
    }

    pub fn observer_count(&self) -> usize {
        self.connections
            .values()
            .filter(|c| matches!(c.role, Role::Observer(_)))
            .count()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queues a frame for one connection
    pub fn send_to(&self, conn_id: u32, frame: &Frame) {
        if let Some(conn) = self.connections.get(&conn_id) {
            if let Err(e) = conn.push(frame) {
                warn!("Dropping frame for connection {}: {}", conn_id, e);
            }
        }
    }

    /// Queues a frame for every connection
    ///
    /// Observers whose outbox refuses the frame are removed and returned.
    /// Seats are never dropped here; a dead seat is noticed by its reader.
    pub fn broadcast(&mut self, frame: &Frame) -> Vec<u32> {
        let mut dropped = Vec::new();

        for conn in self.connections.values() {
            if let Err(e) = conn.push(frame) {
                match conn.role {
                    Role::Observer(observer) => {
                        debug!("Observer {} can't keep up ({}), dropping it", observer, e);
                        dropped.push(conn.id);
                    }
                    Role::Seat(seat) => warn!("Seat {} outbox rejected a frame: {}", seat, e),
                }
            }
        }

        for conn_id in &dropped {
            self.connections.remove(conn_id);
        }
        dropped
    }

    /// Drops every outbox so writer tasks flush what they have and exit
    pub fn close_all(&mut self) {
        self.connections.clear();
    }
}
