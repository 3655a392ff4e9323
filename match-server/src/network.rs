//! Match server network layer: TCP connections and the simulation loop

use crate::client_manager::{ClientManager, Frame, Role};
use crate::config::MatchConfig;
use crate::game::{base_drop_interval, GameState, MatchOutcome};
use crate::report::submit_report;
use log::{debug, error, info, warn};
use shared::framing::read_frame_bytes;
use shared::{encode_frame, get_timestamp, GravityInfo, MatchMessage, MatchMode, SeatId};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Frames a single connection may have queued before it counts as stalled
const OUTBOX_CAPACITY: usize = 64;

/// How long finished writers get to flush `game_over`
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Accepted { stream: TcpStream, addr: SocketAddr },
    Received { conn_id: u32, message: MatchMessage },
    Closed { conn_id: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Seats are still being claimed
    Waiting,
    /// `start` was broadcast; simulation begins at the given instant
    Countdown(Instant),
    Running,
}

/// One match: owns the listener, the connections and the authoritative state
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    config: MatchConfig,
    clients: ClientManager,
    game_state: GameState,
    phase: Phase,
    /// Replayed to observers that attach after the announcement
    start_frame: Option<Frame>,
    writers: Vec<JoinHandle<()>>,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn bind(config: MatchConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        info!(
            "Match for room {} listening on {} (seed {})",
            config.room_id, local_addr, seed
        );

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            config,
            clients: ClientManager::new(),
            game_state: GameState::new(seed),
            phase: Phase::Waiting,
            start_frame: None,
            writers: Vec::new(),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns task that accepts connections and hands them to the main loop
    fn spawn_acceptor(&mut self) -> Option<JoinHandle<()>> {
        let listener = self.listener.take()?;
        let server_tx = self.server_tx.clone();

        Some(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if server_tx
                            .send(ServerMessage::Accepted { stream, addr })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }))
    }

    /// Spawns task that reads frames from one connection until it closes
    ///
    /// Bodies that are valid frames but not a known message are skipped.
    fn spawn_reader(&self, conn_id: u32, mut reader: OwnedReadHalf) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                let body = match read_frame_bytes(&mut reader).await {
                    Ok(body) => body,
                    Err(e) => {
                        debug!("Connection {} reader stopped: {}", conn_id, e);
                        break;
                    }
                };

                match serde_json::from_slice::<MatchMessage>(&body) {
                    Ok(message) => {
                        if server_tx
                            .send(ServerMessage::Received { conn_id, message })
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(e) => debug!("Ignoring message from connection {}: {}", conn_id, e),
                }
            }

            let _ = server_tx.send(ServerMessage::Closed { conn_id });
        });
    }

    /// Spawns task that drains one connection's outbox onto the socket
    fn spawn_writer(
        conn_id: u32,
        mut writer: OwnedWriteHalf,
        mut outbox: mpsc::Receiver<Frame>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(frame) = outbox.recv().await {
                if let Err(e) = writer.write_all(&frame).await {
                    debug!("Failed to write to connection {}: {}", conn_id, e);
                    return;
                }
            }
            let _ = writer.shutdown().await;
        })
    }

    fn encode(message: &MatchMessage) -> Option<Frame> {
        match encode_frame(message) {
            Ok(frame) => Some(Arc::new(frame)),
            Err(e) => {
                error!("Failed to encode {:?}: {}", message, e);
                None
            }
        }
    }

    fn send_to(&self, conn_id: u32, message: &MatchMessage) {
        if let Some(frame) = Self::encode(message) {
            self.clients.send_to(conn_id, &frame);
        }
    }

    fn broadcast(&mut self, message: &MatchMessage) -> Option<Frame> {
        let frame = Self::encode(message)?;
        for conn_id in self.clients.broadcast(&frame) {
            info!("Observer connection {} dropped", conn_id);
        }
        Some(frame)
    }

    fn handle_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
        }
        let (reader, writer) = stream.into_split();
        let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);

        let (conn_id, role) = self.clients.add_connection(addr, outbox_tx);
        self.writers
            .push(Self::spawn_writer(conn_id, writer, outbox_rx));
        self.spawn_reader(conn_id, reader);

        let welcome = match role {
            Role::Seat(seat) => {
                self.game_state
                    .add_seat(seat, format!("P{}", seat), None, Instant::now());
                MatchMessage::Welcome {
                    player_id: Some(seat),
                    observer_id: None,
                }
            }
            Role::Observer(observer) => MatchMessage::Welcome {
                player_id: None,
                observer_id: Some(observer),
            },
        };
        self.send_to(conn_id, &welcome);

        if let (Role::Observer(_), Some(start)) = (role, &self.start_frame) {
            self.clients.send_to(conn_id, start);
        }
    }

    fn handle_message(&mut self, conn_id: u32, message: MatchMessage) {
        let Some(role) = self.clients.role_of(conn_id) else {
            return;
        };

        match (role, message) {
            (Role::Seat(seat), MatchMessage::Hello { name, user_id }) => {
                if self.phase != Phase::Waiting {
                    debug!("Late hello from seat {} ignored", seat);
                    return;
                }
                info!("Seat {} is {} (user {:?})", seat, name, user_id);
                self.game_state.identify_seat(seat, name, user_id);
                self.clients.mark_identified(conn_id);
                self.maybe_announce();
            }
            (Role::Seat(seat), MatchMessage::Input { ev, .. }) => {
                self.game_state
                    .enqueue_input(seat, ev, Instant::now());
            }
            (role, other) => debug!("Ignoring {:?} from {:?}", other, role),
        }
    }

    fn handle_closed(&mut self, conn_id: u32) {
        let Some(conn) = self.clients.remove_connection(conn_id) else {
            return;
        };

        if let Role::Seat(seat) = conn.role {
            self.seat_lost(seat);
        }
    }

    /// A seat that leaves before the announcement frees its slot; afterwards it loses
    fn seat_lost(&mut self, seat: SeatId) {
        if self.phase == Phase::Waiting {
            self.game_state.remove_seat(seat);
        } else {
            warn!("Seat {} disconnected mid-match", seat);
            self.game_state.mark_disconnected(seat);
        }
    }

    /// Broadcasts `start` once both seats have introduced themselves
    fn maybe_announce(&mut self) {
        if self.phase != Phase::Waiting || !self.clients.seats_ready() {
            return;
        }

        self.clients.close_seats();
        let delay = self.config.start_delay;
        let start = MatchMessage::Start {
            seed: self.game_state.seed,
            bag_rule: "7bag".to_string(),
            gravity: GravityInfo {
                drop_interval_ms: base_drop_interval().as_millis() as u64,
            },
            mode: MatchMode {
                mode: "endless".to_string(),
                seconds: None,
            },
            t0_server_ms: get_timestamp() + delay.as_millis() as u64,
        };

        self.start_frame = self.broadcast(&start);
        self.phase = Phase::Countdown(Instant::now() + delay);
        info!("Both seats ready, match starts in {:?}", delay);
    }

    fn handle_tick(&mut self) {
        let now = Instant::now();

        match self.phase {
            Phase::Countdown(begin_at) if now >= begin_at => {
                self.game_state.start(now);
                self.phase = Phase::Running;
                info!("Match started");
            }
            Phase::Running => {
                self.game_state.update(now);
                if self.game_state.tick % 600 == 0 {
                    debug!(
                        "Tick {}: {} connections, {} alive",
                        self.game_state.tick,
                        self.clients.len(),
                        self.game_state.alive_count()
                    );
                }
                if let Some(limit) = self.config.idle_timeout {
                    for seat in self.game_state.expire_idle(now, limit) {
                        warn!("Seat {} produced no input for {:?}", seat, limit);
                    }
                }
            }
            _ => {}
        }
    }

    fn broadcast_snapshot(&mut self) {
        if self.phase != Phase::Running {
            return;
        }
        let snapshot = self.game_state.snapshot(get_timestamp());
        self.broadcast(&snapshot);
    }

    fn is_over(&self) -> bool {
        self.phase == Phase::Running && self.game_state.is_finished()
    }

    /// Final broadcast, connection teardown and the report to the lobby
    async fn finish(&mut self) -> MatchOutcome {
        let outcome = self.game_state.outcome();
        info!(
            "Game over ({}), winner seat {:?} user {:?}",
            outcome.reason, outcome.winner, outcome.winner_user_id
        );

        self.broadcast(&outcome.to_message());
        self.clients.close_all();
        for writer in self.writers.drain(..) {
            if timeout(FLUSH_TIMEOUT, writer).await.is_err() {
                debug!("Writer did not finish flushing in time");
            }
        }

        if let Some(lobby) = self.config.lobby_addr.as_deref() {
            let report = outcome.report_request(self.config.room_id);
            if let Err(e) = submit_report(lobby, &report, self.config.report_timeout).await {
                error!("Failed to report result to lobby: {}", e);
            }
        }

        outcome
    }

    /// Main server loop; returns once every seat is out
    pub async fn run(mut self) -> MatchOutcome {
        let acceptor = self.spawn_acceptor();

        let mut tick_interval = interval(self.config.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut snapshot_interval = interval(self.config.snapshot_interval);
        snapshot_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Waiting for players...");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::Accepted { stream, addr }) => {
                            self.handle_accept(stream, addr);
                        }
                        Some(ServerMessage::Received { conn_id, message }) => {
                            self.handle_message(conn_id, message);
                        }
                        Some(ServerMessage::Closed { conn_id }) => {
                            self.handle_closed(conn_id);
                        }
                        None => break,
                    }
                },

                _ = tick_interval.tick() => self.handle_tick(),

                _ = snapshot_interval.tick() => self.broadcast_snapshot(),
            }

            if self.is_over() {
                break;
            }
        }

        if let Some(acceptor) = acceptor {
            acceptor.abort();
        }
        self.finish().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{read_frame, write_frame, InputEvent};

    fn fast_config() -> MatchConfig {
        MatchConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            room_id: 9,
            tick_duration: Duration::from_millis(5),
            snapshot_interval: Duration::from_millis(20),
            start_delay: Duration::from_millis(50),
            seed: Some(4),
            ..MatchConfig::default()
        }
    }

    async fn next_of_type(stream: &mut TcpStream, wanted: &str) -> MatchMessage {
        loop {
            let message: MatchMessage = read_frame(stream).await.unwrap();
            let value = serde_json::to_value(&message).unwrap();
            if value["type"] == wanted {
                return message;
            }
        }
    }

    async fn join(addr: SocketAddr, name: &str, user_id: u64) -> (TcpStream, MatchMessage) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let welcome: MatchMessage = read_frame(&mut stream).await.unwrap();
        let hello = MatchMessage::Hello {
            name: name.to_string(),
            user_id: Some(user_id),
        };
        write_frame(&mut stream, &hello).await.unwrap();
        (stream, welcome)
    }

    #[test]
    fn test_server_message_creation() {
        let msg = ServerMessage::Received {
            conn_id: 3,
            message: MatchMessage::Input {
                when_ms: 10,
                ev: InputEvent::Hold,
            },
        };

        match msg {
            ServerMessage::Received { conn_id, message } => {
                assert_eq!(conn_id, 3);
                assert!(matches!(message, MatchMessage::Input { ev: InputEvent::Hold, .. }));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[tokio::test]
    async fn test_seats_are_welcomed_then_started() {
        let server = Server::bind(fast_config()).await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.run());

        let (mut a, welcome_a) = join(addr, "ann", 1).await;
        let (mut b, welcome_b) = join(addr, "bob", 2).await;
        assert_eq!(
            welcome_a,
            MatchMessage::Welcome {
                player_id: Some(1),
                observer_id: None
            }
        );
        assert_eq!(
            welcome_b,
            MatchMessage::Welcome {
                player_id: Some(2),
                observer_id: None
            }
        );

        for stream in [&mut a, &mut b] {
            match next_of_type(stream, "start").await {
                MatchMessage::Start {
                    seed,
                    bag_rule,
                    gravity,
                    ..
                } => {
                    assert_eq!(seed, 4);
                    assert_eq!(bag_rule, "7bag");
                    assert_eq!(gravity.drop_interval_ms, 800);
                }
                _ => unreachable!(),
            }
        }

        match next_of_type(&mut a, "snapshot").await {
            MatchMessage::Snapshot { players, .. } => {
                assert_eq!(players.len(), 2);
                assert_eq!(players[0].name, "ann");
                assert_eq!(players[1].name, "bob");
                assert!(players.iter().all(|p| p.alive));
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_third_connection_is_an_observer() {
        let server = Server::bind(fast_config()).await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.run());

        let (_a, _) = join(addr, "ann", 1).await;
        let (_b, _) = join(addr, "bob", 2).await;

        let mut watcher = TcpStream::connect(addr).await.unwrap();
        let welcome: MatchMessage = read_frame(&mut watcher).await.unwrap();
        assert_eq!(
            welcome,
            MatchMessage::Welcome {
                player_id: None,
                observer_id: Some(1)
            }
        );
        assert!(matches!(
            next_of_type(&mut watcher, "snapshot").await,
            MatchMessage::Snapshot { .. }
        ));
    }

    #[tokio::test]
    async fn test_seat_freed_before_start() {
        let server = Server::bind(fast_config()).await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.run());

        let (first, _) = join(addr, "ann", 1).await;
        drop(first);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (_again, welcome) = join(addr, "cat", 3).await;
        assert_eq!(
            welcome,
            MatchMessage::Welcome {
                player_id: Some(1),
                observer_id: None
            }
        );
    }

    #[tokio::test]
    async fn test_both_disconnects_end_match() {
        let server = Server::bind(fast_config()).await.unwrap();
        let addr = server.local_addr();
        let match_task = tokio::spawn(server.run());

        let (mut a, _) = join(addr, "ann", 11).await;
        let (mut b, _) = join(addr, "bob", 22).await;
        next_of_type(&mut a, "start").await;
        next_of_type(&mut b, "start").await;

        next_of_type(&mut a, "snapshot").await;
        drop(a);
        drop(b);

        let outcome = timeout(Duration::from_secs(5), match_task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.reason, "both_dead");
        assert_eq!(outcome.result.len(), 2);
        assert_eq!(outcome.result["p1"].user_id, Some(11));
        assert_eq!(outcome.result["p2"].user_id, Some(22));
    }

    #[tokio::test]
    async fn test_observer_receives_game_over() {
        let server = Server::bind(fast_config()).await.unwrap();
        let addr = server.local_addr();
        let match_task = tokio::spawn(server.run());

        let (mut a, _) = join(addr, "ann", 11).await;
        let (b, _) = join(addr, "bob", 22).await;
        next_of_type(&mut a, "start").await;

        let mut watcher = TcpStream::connect(addr).await.unwrap();
        next_of_type(&mut watcher, "snapshot").await;
        drop(a);
        drop(b);

        let game_over = timeout(Duration::from_secs(5), next_of_type(&mut watcher, "game_over"))
            .await
            .unwrap();
        match game_over {
            MatchMessage::GameOver { reason, result, .. } => {
                assert_eq!(reason, "both_dead");
                assert_eq!(result["p1"].user_id, Some(11));
                assert_eq!(result["p2"].user_id, Some(22));
            }
            _ => unreachable!(),
        }

        timeout(Duration::from_secs(5), match_task)
            .await
            .unwrap()
            .unwrap();
    }
}
