//! Physics state group: pose and velocities of one body.
//!
//! Payload layout:
//!
//! ```text
//! moving: bool
//! transform (absolute position, orientation per `low_precision`)
//! velocities (only when moving)
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use bitstream::{BitReader, BitWriter};
use codec::{
    accept_transform, is_accelerating, is_moving, read_transform, read_velocities,
    transform_bits, write_transform, write_velocities, CodecConfig, Pose, TransformRejection,
    Velocities, HALF_VEC3_BITS,
};
use tracing::trace;
use wire::{Endpoint, PacketId, ReplicableId};

use crate::client::ClientInfo;
use crate::error::{GroupError, GroupResult};
use crate::group::{GroupKind, StateGroup, SyncOutcome};
use crate::priority::{ramp_priority, PrioritySettings};

/// Access to the simulated body behind a physics group.
pub trait PhysicsBody {
    fn pose(&self) -> Pose;
    fn set_pose(&mut self, pose: Pose);
    fn velocities(&self) -> Velocities;
    fn set_velocities(&mut self, velocities: Velocities);
    /// Linear and angular acceleration over the last step.
    fn accelerations(&self) -> Velocities;
    fn has_physics(&self) -> bool;
    fn is_static(&self) -> bool;
    /// Endpoint of the player controlling this body, if any.
    fn controller(&self) -> Option<Endpoint>;
    /// Current simulation speed relative to real time.
    fn simulation_ratio(&self) -> f32 {
        1.0
    }
}

impl<T: PhysicsBody> PhysicsBody for Rc<RefCell<T>> {
    fn pose(&self) -> Pose {
        self.borrow().pose()
    }

    fn set_pose(&mut self, pose: Pose) {
        self.borrow_mut().set_pose(pose);
    }

    fn velocities(&self) -> Velocities {
        self.borrow().velocities()
    }

    fn set_velocities(&mut self, velocities: Velocities) {
        self.borrow_mut().set_velocities(velocities);
    }

    fn accelerations(&self) -> Velocities {
        self.borrow().accelerations()
    }

    fn has_physics(&self) -> bool {
        self.borrow().has_physics()
    }

    fn is_static(&self) -> bool {
        self.borrow().is_static()
    }

    fn controller(&self) -> Option<Endpoint> {
        self.borrow().controller()
    }

    fn simulation_ratio(&self) -> f32 {
        self.borrow().simulation_ratio()
    }
}

/// Plain-data body, enough for replicas and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyState {
    pub pose: Pose,
    pub velocities: Velocities,
    pub accelerations: Velocities,
    pub has_physics: bool,
    pub is_static: bool,
    pub controller: Option<Endpoint>,
    pub simulation_ratio: f32,
}

impl Default for BodyState {
    fn default() -> Self {
        Self {
            pose: Pose::default(),
            velocities: Velocities::ZERO,
            accelerations: Velocities::ZERO,
            has_physics: true,
            is_static: false,
            controller: None,
            simulation_ratio: 1.0,
        }
    }
}

impl PhysicsBody for BodyState {
    fn pose(&self) -> Pose {
        self.pose
    }

    fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    fn velocities(&self) -> Velocities {
        self.velocities
    }

    fn set_velocities(&mut self, velocities: Velocities) {
        self.velocities = velocities;
    }

    fn accelerations(&self) -> Velocities {
        self.accelerations
    }

    fn has_physics(&self) -> bool {
        self.has_physics
    }

    fn is_static(&self) -> bool {
        self.is_static
    }

    fn controller(&self) -> Option<Endpoint> {
        self.controller
    }

    fn simulation_ratio(&self) -> f32 {
        self.simulation_ratio
    }
}

/// Receive-side counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysicsStats {
    pub applied: u64,
    pub rejected_controlled_locally: u64,
    pub rejected_not_moving: u64,
    pub rejected_invalid: u64,
}

/// Movement class used to pick cadence and priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementClass {
    Accelerating,
    LinearMoving,
    Stopped,
}

/// Replicates the pose and velocities of a [`PhysicsBody`].
pub struct PhysicsGroup<B> {
    body: B,
    owner: ReplicableId,
    local_endpoint: Endpoint,
    settings: PrioritySettings,
    config: CodecConfig,
    low_precision: bool,
    last_movement_frame: Option<u64>,
    clients: HashSet<Endpoint>,
    stats: PhysicsStats,
}

impl<B: PhysicsBody> PhysicsGroup<B> {
    /// Group for `body` on the peer identified by `local_endpoint`.
    ///
    /// The server passes [`Endpoint::SERVER`].
    pub fn new(body: B, owner: ReplicableId, local_endpoint: Endpoint) -> Self {
        Self {
            body,
            owner,
            local_endpoint,
            settings: PrioritySettings::default(),
            config: CodecConfig::default(),
            low_precision: false,
            last_movement_frame: None,
            clients: HashSet::new(),
            stats: PhysicsStats::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: PrioritySettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_codec_config(mut self, config: CodecConfig) -> Self {
        self.config = config;
        self
    }

    /// Send orientation with the 29-bit compressed quaternion.
    #[must_use]
    pub fn with_low_precision(mut self, low_precision: bool) -> Self {
        self.low_precision = low_precision;
        self
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }

    #[must_use]
    pub const fn stats(&self) -> PhysicsStats {
        self.stats
    }

    fn is_moving(&self) -> bool {
        !self.body.has_physics() || is_moving(&self.body.velocities(), &self.config)
    }

    fn is_accelerating(&self) -> bool {
        if !self.body.has_physics() {
            return true;
        }
        let acc = self.body.accelerations();
        is_accelerating(acc.linear, acc.angular, &self.config)
    }

    /// Classifies the body, recording `frame` as a movement frame if it moves.
    pub fn movement_class(&mut self, frame: u64) -> MovementClass {
        if self.is_moving() {
            self.last_movement_frame = Some(frame);
        }
        let stopped = match self.last_movement_frame {
            Some(last) => frame.saturating_sub(last) > u64::from(self.settings.stop_after_update_count),
            None => true,
        };
        if stopped {
            MovementClass::Stopped
        } else if self.is_accelerating() {
            MovementClass::Accelerating
        } else {
            MovementClass::LinearMoving
        }
    }

    /// The endpoint whose copy of the body is authoritative.
    fn responsible_endpoint(&self) -> Endpoint {
        self.body.controller().unwrap_or(Endpoint::SERVER)
    }

    fn controlled_locally(&self) -> bool {
        self.body.controller() == Some(self.local_endpoint)
    }

    fn required_bits(&self, moving: bool) -> usize {
        let velocities = if moving { 2 * HALF_VEC3_BITS } else { 0 };
        1 + transform_bits(false, self.low_precision) + velocities
    }

    fn record_rejection(&mut self, rejection: TransformRejection) {
        match rejection {
            TransformRejection::ControlledLocally => self.stats.rejected_controlled_locally += 1,
            TransformRejection::NotMoving => self.stats.rejected_not_moving += 1,
            TransformRejection::InvalidOrientation => self.stats.rejected_invalid += 1,
        }
    }
}

impl<B: PhysicsBody> StateGroup for PhysicsGroup<B> {
    fn kind(&self) -> GroupKind {
        GroupKind::Physics
    }

    fn create_client_data(&mut self, client: &ClientInfo) {
        self.clients.insert(client.endpoint);
    }

    fn destroy_client_data(&mut self, endpoint: Endpoint) {
        self.clients.remove(&endpoint);
    }

    fn group_priority(&mut self, frames_since_sync: u32, client: &ClientInfo) -> f32 {
        if !self.body.has_physics() || self.body.is_static() {
            return 0.0;
        }
        if self.responsible_endpoint() == client.endpoint {
            return 0.0;
        }
        let (update_count, priority) = match self.movement_class(client.frame) {
            MovementClass::Accelerating => (
                self.settings.accelerating_update_count,
                self.settings.accelerating_priority,
            ),
            MovementClass::LinearMoving => (
                self.settings.linear_moving_update_count,
                self.settings.linear_moving_priority,
            ),
            MovementClass::Stopped => (
                self.settings.stopped_update_count,
                self.settings.stopped_priority,
            ),
        };
        let mut update_once_per = update_count as f32;
        if self.settings.compensate_slow_simulation {
            update_once_per *= self
                .config
                .effective_simulation_ratio(self.body.simulation_ratio());
        }
        ramp_priority(
            priority * client.importance(self.owner),
            frames_since_sync,
            update_once_per,
            self.settings.ramp_amount,
        )
    }

    fn serialize(
        &mut self,
        writer: &mut BitWriter,
        endpoint: Endpoint,
        packet_id: PacketId,
        max_bit_position: usize,
    ) -> GroupResult<SyncOutcome> {
        if !self.clients.contains(&endpoint) {
            return Err(GroupError::UnknownClient { endpoint });
        }
        let moving = is_moving(&self.body.velocities(), &self.config);
        if writer.bit_position() + self.required_bits(moving) > max_bit_position {
            return Ok(SyncOutcome::DidNotFit);
        }
        writer.write_bool(moving);
        write_transform(writer, &self.body.pose(), None, self.low_precision)?;
        write_velocities(
            writer,
            &self.body.velocities(),
            moving,
            self.body.simulation_ratio(),
            &self.config,
        )?;
        trace!(?endpoint, packet_id = packet_id.raw(), owner = %self.owner, moving, "physics serialized");
        Ok(SyncOutcome::Sent)
    }

    fn deserialize(&mut self, reader: &mut BitReader<'_>) -> GroupResult<()> {
        let moving = reader.read_bool()?;
        let received = read_transform(reader, None)?;
        let velocities = read_velocities(reader, moving, self.body.simulation_ratio(), &self.config)?;

        let controlled_locally = self.controlled_locally();
        match accept_transform(
            &received,
            &self.body.pose(),
            moving,
            controlled_locally,
            &self.config,
        ) {
            Ok(pose) => {
                self.body.set_pose(pose);
                self.stats.applied += 1;
            }
            Err(rejection) => {
                trace!(owner = %self.owner, ?rejection, "transform not applied");
                self.record_rejection(rejection);
            }
        }
        if !controlled_locally && self.body.has_physics() {
            self.body.set_velocities(velocities);
        }
        Ok(())
    }

    fn on_ack(&mut self, endpoint: Endpoint, packet_id: PacketId, delivered: bool) {
        // Every send carries the full state, so a loss needs no retry bookkeeping.
        trace!(?endpoint, packet_id = packet_id.raw(), delivered, "physics ack");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::{Quat, Vec3, Vec3d};

    fn moving_body() -> BodyState {
        BodyState {
            pose: Pose::new(Vec3d::new(10.0, 20.0, 30.0), Quat::IDENTITY),
            velocities: Velocities::new(Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO),
            ..BodyState::default()
        }
    }

    fn group(body: BodyState) -> PhysicsGroup<BodyState> {
        PhysicsGroup::new(body, ReplicableId::new(1), Endpoint::SERVER)
            .with_settings(PrioritySettings::for_testing())
            .with_codec_config(CodecConfig::for_testing())
    }

    fn client(frame: u64) -> ClientInfo {
        let mut info = ClientInfo::new(Endpoint::new(5));
        info.frame = frame;
        info
    }

    #[test]
    fn static_and_bodiless_objects_have_no_priority() {
        let mut g = group(BodyState {
            is_static: true,
            ..moving_body()
        });
        assert_eq!(g.group_priority(100, &client(1)), 0.0);
        let mut g = group(BodyState {
            has_physics: false,
            ..moving_body()
        });
        assert_eq!(g.group_priority(100, &client(1)), 0.0);
    }

    #[test]
    fn controlling_client_is_not_sent_its_own_body() {
        let mut g = group(BodyState {
            controller: Some(Endpoint::new(5)),
            ..moving_body()
        });
        assert_eq!(g.group_priority(100, &client(1)), 0.0);
        let other = ClientInfo::new(Endpoint::new(6));
        assert!(g.group_priority(100, &other) > 0.0);
    }

    #[test]
    fn stops_only_after_hysteresis() {
        let mut g = group(moving_body());
        assert_eq!(g.movement_class(10), MovementClass::LinearMoving);
        g.body_mut().velocities = Velocities::ZERO;
        assert_eq!(g.movement_class(12), MovementClass::LinearMoving);
        assert_eq!(g.movement_class(13), MovementClass::LinearMoving);
        assert_eq!(g.movement_class(14), MovementClass::Stopped);
    }

    #[test]
    fn acceleration_raises_class() {
        let mut g = group(BodyState {
            accelerations: Velocities::new(Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO),
            ..moving_body()
        });
        assert_eq!(g.movement_class(1), MovementClass::Accelerating);
    }

    #[test]
    fn accelerating_outranks_coasting() {
        let mut coasting = group(moving_body());
        let mut accelerating = group(BodyState {
            accelerations: Velocities::new(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO),
            ..moving_body()
        });
        let info = client(1);
        assert!(accelerating.group_priority(8, &info) > coasting.group_priority(8, &info));
    }

    #[test]
    fn importance_scales_priority() {
        let mut g = group(moving_body());
        let base = g.group_priority(4, &client(1));
        let boosted = g.group_priority(4, &client(1).with_importance(ReplicableId::new(1), 2.0));
        assert!((boosted - 2.0 * base).abs() < 1e-6);
    }

    #[test]
    fn serialize_requires_client_data() {
        let mut g = group(moving_body());
        let mut writer = BitWriter::new();
        let err = g
            .serialize(&mut writer, Endpoint::new(5), PacketId::new(0), 10_000)
            .unwrap_err();
        assert_eq!(err, GroupError::UnknownClient { endpoint: Endpoint::new(5) });
    }

    #[test]
    fn does_not_fit_writes_nothing() {
        let mut g = group(moving_body());
        g.create_client_data(&client(0));
        let mut writer = BitWriter::new();
        let outcome = g
            .serialize(&mut writer, Endpoint::new(5), PacketId::new(0), 100)
            .unwrap();
        assert_eq!(outcome, SyncOutcome::DidNotFit);
        assert_eq!(writer.bits_written(), 0);
    }

    #[test]
    fn server_to_client_roundtrip() {
        let mut server = group(moving_body());
        server.create_client_data(&client(0));
        let mut writer = BitWriter::new();
        let outcome = server
            .serialize(&mut writer, Endpoint::new(5), PacketId::new(0), 10_000)
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Sent);
        assert_eq!(writer.bits_written(), server.required_bits(true));
        let bytes = writer.finish();

        let mut replica = PhysicsGroup::new(BodyState::default(), ReplicableId::new(1), Endpoint::new(5))
            .with_codec_config(CodecConfig::for_testing());
        replica.deserialize(&mut BitReader::new(&bytes)).unwrap();
        assert_eq!(replica.body().pose.position, Vec3d::new(10.0, 20.0, 30.0));
        assert!((replica.body().velocities.linear.x - 3.0).abs() < 1e-3);
        assert_eq!(replica.stats().applied, 1);
    }

    #[test]
    fn locally_controlled_replica_keeps_its_state() {
        let mut server = group(moving_body());
        server.create_client_data(&client(0));
        let mut writer = BitWriter::new();
        server
            .serialize(&mut writer, Endpoint::new(5), PacketId::new(0), 10_000)
            .unwrap();
        let bytes = writer.finish();

        let local = BodyState {
            controller: Some(Endpoint::new(5)),
            ..BodyState::default()
        };
        let mut replica = PhysicsGroup::new(local, ReplicableId::new(1), Endpoint::new(5));
        replica.deserialize(&mut BitReader::new(&bytes)).unwrap();
        assert_eq!(replica.body().pose, Pose::default());
        assert_eq!(replica.body().velocities, Velocities::ZERO);
        assert_eq!(replica.stats().rejected_controlled_locally, 1);
    }

    #[test]
    fn shared_body_through_rc() {
        let body = Rc::new(RefCell::new(moving_body()));
        let mut g = PhysicsGroup::new(Rc::clone(&body), ReplicableId::new(1), Endpoint::SERVER);
        body.borrow_mut().pose.position = Vec3d::new(1.0, 1.0, 1.0);
        assert_eq!(g.body().pose().position, Vec3d::new(1.0, 1.0, 1.0));
        g.body_mut().set_velocities(Velocities::ZERO);
        assert_eq!(body.borrow().velocities, Velocities::ZERO);
    }
}
