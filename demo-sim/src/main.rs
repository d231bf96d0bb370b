use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use codec::{CodecConfig, Pose, Quat, Vec3, Vec3d, Velocities};
use groups::{
    BodyState, ClientContext, ClientInfo, ClientView, CollectionGroup, CollectionSyncConfig,
    ContextKind, GroupKind, Inventory, InventoryItem, ItemCollection, PhysicsGroup,
    PrioritySettings, StateGroup,
};
use repgraph::{
    ClientStats, MemoryTransport, ReplicaFactory, Replicable, ReplicationClient,
    ReplicationServer, ReplicationStats, ServerConfig,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::{prelude::*, registry::Registry, EnvFilter};
use wire::{CreateMessage, Endpoint, FrameReader, MessageKind, ReplicableId};

const SHIP: u16 = 1;
const ITEM_TYPES: u16 = 6;

#[derive(Parser)]
#[command(
    name = "demo-sim",
    version,
    about = "Replicates ships over a deterministic lossy link"
)]
struct Cli {
    /// Number of connected clients. Client `n` controls ship `n`.
    #[arg(long, default_value_t = 4)]
    clients: u32,
    /// Number of ships. Raised to at least `clients`.
    #[arg(long, default_value_t = 24)]
    ships: u32,
    /// Number of ticks to simulate before the lossless settle phase.
    #[arg(long, default_value_t = 600)]
    ticks: u32,
    /// Ticks without loss at the end, used to check convergence.
    #[arg(long, default_value_t = 120)]
    settle_ticks: u32,
    /// RNG seed for deterministic results.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Percentage of state-sync frames dropped by the link.
    #[arg(long, default_value_t = 20)]
    loss_percent: u32,
    /// Per-client MTU in bytes.
    #[arg(long, default_value_t = 1199)]
    mtu: usize,
    /// View radius around each client's ship.
    #[arg(long, default_value_t = 400.0)]
    view_radius: f64,
    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log: String,
    /// Write the JSON summary here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log)?;

    let mut sim = Sim::new(&cli);
    info!(
        clients = cli.clients,
        ships = sim.ships.len(),
        loss_percent = cli.loss_percent,
        "simulation started"
    );
    for tick in 1..=cli.ticks {
        sim.step(tick);
        sim.exchange(cli.loss_percent)?;
    }
    for tick in cli.ticks + 1..=cli.ticks + cli.settle_ticks {
        sim.step_quiet(tick);
        sim.exchange(0)?;
    }

    let summary = sim.summary(&cli);
    if summary.diverged_clients > 0 {
        warn!(diverged = summary.diverged_clients, "inventories did not converge");
    }
    let contents = serde_json::to_string_pretty(&summary).context("serialize summary")?;
    match &cli.out {
        Some(path) => {
            fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
        }
        None => println!("{contents}"),
    }
    if summary.diverged_clients > 0 {
        anyhow::bail!("{} clients diverged", summary.diverged_clients);
    }
    Ok(())
}

fn init_logging(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("parse log filter")?;
    let fmt_layer = tracing_subscriber::fmt::Layer::default().with_writer(std::io::stderr);
    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("install tracing subscriber")
}

/// Server-side ship state shared with its replication groups.
struct Ship {
    id: ReplicableId,
    body: Rc<RefCell<BodyState>>,
    cargo: Rc<RefCell<Inventory>>,
}

/// Registry view of a ship: relevance follows the live body position.
struct ShipReplicable {
    body: Rc<RefCell<BodyState>>,
}

impl Replicable for ShipReplicable {
    fn type_tag(&self) -> u16 {
        SHIP
    }

    fn position(&self) -> Option<Vec3d> {
        Some(self.body.borrow().pose.position)
    }

    fn create_payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// Client replica storage.
#[derive(Default)]
struct Replicas {
    endpoint: Endpoint,
    bodies: HashMap<ReplicableId, Rc<RefCell<BodyState>>>,
    cargo: HashMap<ReplicableId, Rc<RefCell<Inventory>>>,
}

impl ReplicaFactory for Replicas {
    fn create(&mut self, message: &CreateMessage) -> Option<Vec<Box<dyn StateGroup>>> {
        if message.type_tag != SHIP {
            return None;
        }
        let id = message.replicable;
        let body = Rc::new(RefCell::new(BodyState::default()));
        let cargo = Rc::new(RefCell::new(Inventory::new(Some(id))));
        self.bodies.insert(id, Rc::clone(&body));
        self.cargo.insert(id, Rc::clone(&cargo));
        Some(vec![
            Box::new(PhysicsGroup::new(body, id, self.endpoint)),
            Box::new(
                CollectionGroup::new(cargo, CollectionSyncConfig::default())
                    .with_kind(GroupKind::Inventory),
            ),
        ])
    }

    fn destroy(&mut self, replicable: ReplicableId) {
        self.bodies.remove(&replicable);
        self.cargo.remove(&replicable);
    }
}

struct Sim {
    server: ReplicationServer<MemoryTransport>,
    clients: Vec<ReplicationClient<Replicas>>,
    ships: Vec<Ship>,
    rng: Rng,
    link: LinkStats,
}

#[derive(Debug, Default, Serialize)]
struct LinkStats {
    frames_sent: u64,
    frames_dropped: u64,
    state_bytes: u64,
    reliable_bytes: u64,
    largest_frame: usize,
}

impl Sim {
    fn new(cli: &Cli) -> Self {
        let mut rng = Rng::new(cli.seed);
        let mut server = ReplicationServer::new(
            MemoryTransport::new(),
            ServerConfig::default().with_default_mtu_bytes(cli.mtu),
        );

        let count = cli.ships.max(cli.clients);
        let mut ships = Vec::with_capacity(count as usize);
        for index in 0..count {
            let id = ReplicableId::new(u64::from(index) + 1);
            let body = Rc::new(RefCell::new(BodyState {
                pose: Pose::new(
                    Vec3d::new(
                        rng.range_f64(-1000.0, 1000.0),
                        rng.range_f64(-1000.0, 1000.0),
                        0.0,
                    ),
                    Quat::IDENTITY,
                ),
                velocities: Velocities::new(
                    Vec3::new(rng.range_f32(-5.0, 5.0), rng.range_f32(-5.0, 5.0), 0.0),
                    Vec3::ZERO,
                ),
                ..BodyState::default()
            }));
            let cargo = Rc::new(RefCell::new(Inventory::new(Some(id))));
            for item in 0..rng.below(6) {
                cargo.borrow_mut().add(random_item(&mut rng, item));
            }
            let groups: Vec<Box<dyn StateGroup>> = vec![
                Box::new(
                    PhysicsGroup::new(Rc::clone(&body), id, Endpoint::SERVER)
                        .with_settings(PrioritySettings::default())
                        .with_codec_config(CodecConfig::default()),
                ),
                Box::new(
                    CollectionGroup::new(Rc::clone(&cargo), CollectionSyncConfig::default())
                        .with_kind(GroupKind::Inventory),
                ),
            ];
            let replicable = ShipReplicable {
                body: Rc::clone(&body),
            };
            if let Err(err) = server.add_replicable(id, Box::new(replicable), groups) {
                warn!(%err, "ship not registered");
                continue;
            }
            ships.push(Ship { id, body, cargo });
        }

        let mut sim = Self {
            server,
            clients: Vec::new(),
            ships,
            rng,
            link: LinkStats::default(),
        };
        for index in 0..cli.clients as usize {
            let endpoint = Endpoint::new(index as u64 + 1);
            let Some(ship) = sim.ships.get(index).map(|s| s.id) else {
                break;
            };
            let info = sim.client_info(endpoint, ship, cli.view_radius);
            if let Err(err) = sim.server.subscribe(info) {
                warn!(?endpoint, %err, "subscribe failed");
            }
            sim.clients.push(ReplicationClient::new(
                Replicas {
                    endpoint,
                    ..Replicas::default()
                },
                sim.server.config().limits.clone(),
            ));
        }
        sim
    }

    fn client_info(&self, endpoint: Endpoint, ship: ReplicableId, radius: f64) -> ClientInfo {
        let center = self
            .ships
            .iter()
            .find(|s| s.id == ship)
            .map_or(Vec3d::ZERO, |s| s.body.borrow().pose.position);
        ClientInfo::new(endpoint)
            .with_controlled_entity(ship)
            .with_context(ClientContext::new(ContextKind::Inventory, Some(ship)))
            .with_view(ClientView::new(center, radius))
    }

    /// Moves ships, changes cargo, then runs one replication tick.
    fn step(&mut self, tick: u32) {
        for ship in &self.ships {
            let mut body = ship.body.borrow_mut();
            if self.rng.below(30) == 0 {
                let kick = Vec3::new(
                    self.rng.range_f32(-1.0, 1.0),
                    self.rng.range_f32(-1.0, 1.0),
                    0.0,
                );
                body.velocities.linear = body.velocities.linear + kick;
                body.accelerations.linear = kick;
            } else {
                body.accelerations = Velocities::ZERO;
            }
            advance(&mut body);

            let mut cargo = ship.cargo.borrow_mut();
            match self.rng.below(40) {
                0 => {
                    let id = self.rng.below(12);
                    cargo.add(random_item(&mut self.rng, id));
                }
                1 => {
                    let id = self.rng.below(12);
                    cargo.remove(id);
                }
                2 | 3 => {
                    let id = self.rng.below(12);
                    let amount = i64::from(self.rng.below(500));
                    cargo.set_amount(id, amount);
                }
                _ => {}
            }
        }
        self.follow_ships();
        debug!(tick, "server tick");
        self.server.tick();
    }

    /// Keeps bodies moving but leaves cargo alone.
    fn step_quiet(&mut self, tick: u32) {
        for ship in &self.ships {
            let mut body = ship.body.borrow_mut();
            body.accelerations = Velocities::ZERO;
            advance(&mut body);
        }
        self.follow_ships();
        debug!(tick, "server tick");
        self.server.tick();
    }

    /// Recenters every client's view on the ship it controls.
    fn follow_ships(&mut self) {
        let updates: Vec<ClientInfo> = self
            .clients
            .iter()
            .filter_map(|client| {
                let endpoint = client.factory().endpoint;
                let mut info = self.server.client_info(endpoint)?.clone();
                let ship = info.controlled_entity?;
                let center = self.ships.iter().find(|s| s.id == ship)?.body.borrow().pose.position;
                if let Some(view) = info.view.as_mut() {
                    view.position = center;
                }
                Some(info)
            })
            .collect();
        for info in updates {
            if let Err(err) = self.server.update_client_info(info) {
                warn!(%err, "client info update failed");
            }
        }
    }

    /// Delivers queued messages over the lossy link and reports acks.
    fn exchange(&mut self, loss_percent: u32) -> Result<()> {
        for message in self.server.transport_mut().drain() {
            let index = usize::try_from(message.endpoint.raw())
                .ok()
                .and_then(|raw| raw.checked_sub(1))
                .context("message for unknown endpoint")?;
            let client = self
                .clients
                .get_mut(index)
                .context("message for unknown endpoint")?;

            if message.kind != MessageKind::StateSync {
                self.link.reliable_bytes += message.payload.len() as u64;
                client
                    .receive(message.kind, &message.payload)
                    .with_context(|| format!("apply {:?} on {}", message.kind, message.endpoint))?;
                continue;
            }

            self.link.frames_sent += 1;
            self.link.state_bytes += message.payload.len() as u64;
            self.link.largest_frame = self.link.largest_frame.max(message.payload.len());
            if self.rng.below(100) < loss_percent {
                let limits = self.server.config().limits.clone();
                let packet = FrameReader::new(&message.payload, &limits)
                    .context("read dropped frame header")?
                    .packet_id();
                self.link.frames_dropped += 1;
                self.server.on_ack(message.endpoint, packet, false);
                continue;
            }
            let packet = client
                .receive(message.kind, &message.payload)
                .with_context(|| format!("apply state sync on {}", message.endpoint))?;
            if let Some(packet) = packet {
                self.server.on_ack(message.endpoint, packet, true);
            }
        }
        for client in &mut self.clients {
            client.update();
        }
        Ok(())
    }

    fn summary(&self, cli: &Cli) -> Summary {
        let mut diverged_clients = 0;
        let mut max_position_error: f64 = 0.0;
        for client in &self.clients {
            let replicas = client.factory();
            for ship in &self.ships {
                let Some(body) = replicas.bodies.get(&ship.id) else {
                    continue;
                };
                let error = body
                    .borrow()
                    .pose
                    .position
                    .distance_sq(ship.body.borrow().pose.position)
                    .sqrt();
                max_position_error = max_position_error.max(error);
            }
            let own = self
                .server
                .client_info(replicas.endpoint)
                .and_then(|info| info.controlled_entity);
            let converged = own.is_some_and(|ship| {
                let server = self.ships.iter().find(|s| s.id == ship);
                let replica = replicas.cargo.get(&ship);
                match (server, replica) {
                    (Some(server), Some(replica)) => {
                        server.cargo.borrow().items() == replica.borrow().items()
                    }
                    _ => false,
                }
            });
            if !converged {
                diverged_clients += 1;
            }
        }

        Summary {
            clients: cli.clients,
            ships: self.ships.len(),
            ticks: cli.ticks,
            settle_ticks: cli.settle_ticks,
            seed: cli.seed,
            loss_percent: cli.loss_percent,
            link: &self.link,
            server: self.server.stats(),
            client: self
                .clients
                .iter()
                .map(ReplicationClient::stats)
                .fold(ClientStats::default(), add_client_stats),
            diverged_clients,
            max_position_error,
        }
    }
}

fn advance(body: &mut BodyState) {
    let step = body.velocities.linear;
    let position = &mut body.pose.position;
    position.x += f64::from(step.x) / 60.0;
    position.y += f64::from(step.y) / 60.0;
    position.z += f64::from(step.z) / 60.0;
}

fn random_item(rng: &mut Rng, id: u32) -> InventoryItem {
    InventoryItem::new(
        id,
        rng.below(u32::from(ITEM_TYPES)) as u16,
        0,
        i64::from(rng.below(100)) + 1,
    )
}

fn add_client_stats(mut total: ClientStats, next: ClientStats) -> ClientStats {
    total.creates += next.creates;
    total.creates_rejected += next.creates_rejected;
    total.destroys += next.destroys;
    total.frames += next.frames;
    total.sections_applied += next.sections_applied;
    total.sections_skipped += next.sections_skipped;
    total.section_errors += next.section_errors;
    total
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    clients: u32,
    ships: usize,
    ticks: u32,
    settle_ticks: u32,
    seed: u64,
    loss_percent: u32,
    link: &'a LinkStats,
    server: ReplicationStats,
    client: ClientStats,
    diverged_clients: u32,
    max_position_error: f64,
}

struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.state >> 32) as u32
    }

    fn below(&mut self, bound: u32) -> u32 {
        self.next_u32() % bound.max(1)
    }

    fn range_f32(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * (self.next_u32() as f32 / u32::MAX as f32)
    }

    fn range_f64(&mut self, min: f64, max: f64) -> f64 {
        min + (max - min) * (f64::from(self.next_u32()) / f64::from(u32::MAX))
    }
}
