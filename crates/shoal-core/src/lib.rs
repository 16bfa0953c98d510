//! Core schooling dynamics for a periodic 3D domain.
//!
//! Agents obey three local rules: self-propulsion toward a cruising speed,
//! short-range repulsion with orientation alignment, and a longer-range
//! attraction that only acts while an agent's alarm scalar is positive. The
//! neighbor searches walk precomputed cell stencils from [`shoal_index`] with
//! toroidal indexing and exact minimum-image distance re-tests.
//!
//! # Numeric degeneracies
//!
//! The kernel deliberately carries no epsilon guards. An agent with exactly
//! zero velocity has no heading, so [`self_propulsion`] divides by zero and
//! produces NaN; two agents at exactly coincident positions produce an
//! infinite repulsion or attraction term. Both propagate into the
//! accumulated delta-velocity rather than being masked, uniformly across all
//! interaction paths.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use shoal_index::{CellGrid, CellOffset, IndexError, Stencil, Vec3, min_image, wrap};

/// Errors emitted when assembling a school.
#[derive(Debug, Error)]
pub enum SchoolError {
    /// Indicates a configuration value the simulation cannot run with.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Spatial index construction failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Per-run domain and schedule parameters. Created once from configuration
/// and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Side length of the cubic periodic domain; cells are unit cubes.
    pub domain_side: u32,
    /// Number of agents in the school.
    pub agent_count: usize,
    /// Number of time steps to simulate.
    pub max_steps: u64,
    /// Integration time step.
    pub delta_t: f64,
    /// Steps between position/velocity snapshots.
    pub snapshot_interval: u64,
    /// Optional RNG seed for reproducible initial placement.
    pub rng_seed: Option<u64>,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            domain_side: 32,
            agent_count: 256,
            max_steps: 2_000,
            delta_t: 0.1,
            snapshot_interval: 10,
            rng_seed: None,
        }
    }
}

impl DomainConfig {
    /// Validates the run parameters, failing fast instead of computing
    /// silently wrong trajectories.
    pub fn validate(&self) -> Result<(), SchoolError> {
        if self.domain_side == 0 {
            return Err(SchoolError::InvalidConfig("domain side must be non-zero"));
        }
        if self.agent_count == 0 {
            return Err(SchoolError::InvalidConfig("agent count must be non-zero"));
        }
        if !(self.delta_t > 0.0) {
            return Err(SchoolError::InvalidConfig("delta_t must be positive"));
        }
        if self.snapshot_interval == 0 {
            return Err(SchoolError::InvalidConfig(
                "snapshot interval must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Behavioral parameters shared by every agent. Created once and never
/// mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Cruising speed the self-propulsion term relaxes toward.
    pub cruise_speed: f64,
    /// Speed scale of the repulsion push.
    pub repulsion_speed: f64,
    /// Speed scale of the alarm-gated attraction pull.
    pub escape_speed: f64,
    /// Body length; the close-range gain grows once neighbors pack tighter
    /// than this.
    pub body_length: f64,
    /// Radius of the repulsion/orientation zone.
    pub repulsion_radius: f64,
    /// Outer radius of the attraction annulus; must exceed the repulsion
    /// radius.
    pub attraction_radius: f64,
    /// Alarm is raised when fewer than this many neighbors occupy the
    /// repulsion zone.
    pub cohesion_threshold: u32,
    /// Alarm value set on an isolated agent.
    pub alarm_strength: f64,
    /// Time for a raised alarm to decay back to zero.
    pub alarm_duration: f64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            cruise_speed: 1.0,
            repulsion_speed: 1.0,
            escape_speed: 7.5,
            body_length: 1.0,
            repulsion_radius: 1.0,
            attraction_radius: 7.5,
            cohesion_threshold: 3,
            alarm_strength: 10.0,
            alarm_duration: 0.1,
        }
    }
}

impl BehaviorConfig {
    /// Linear decay applied to the alarm scalar per unit time.
    #[must_use]
    pub fn alarm_decay_rate(&self) -> f64 {
        self.alarm_strength / self.alarm_duration
    }

    /// Validates the behavior parameters against the domain they will run in.
    ///
    /// The domain must span at least twice the attraction radius per axis
    /// for the minimum-image convention to be unambiguous.
    pub fn validate(&self, domain_side: u32) -> Result<(), SchoolError> {
        if !(self.body_length > 0.0) {
            return Err(SchoolError::InvalidConfig("body length must be positive"));
        }
        if !(self.repulsion_radius > 0.0) {
            return Err(SchoolError::InvalidConfig(
                "repulsion radius must be positive",
            ));
        }
        if !(self.attraction_radius > self.repulsion_radius) {
            return Err(SchoolError::InvalidConfig(
                "attraction radius must exceed repulsion radius",
            ));
        }
        if f64::from(domain_side) < 2.0 * self.attraction_radius.ceil() {
            return Err(SchoolError::InvalidConfig(
                "domain side must be at least twice the attraction radius",
            ));
        }
        if !(self.alarm_duration > 0.0) {
            return Err(SchoolError::InvalidConfig(
                "alarm duration must be positive",
            ));
        }
        if self.alarm_strength < 0.0 {
            return Err(SchoolError::InvalidConfig(
                "alarm strength must be non-negative",
            ));
        }
        Ok(())
    }
}

/// One schooling individual.
///
/// `delta_velocity` is the per-step force accumulator: filled by the
/// accumulation pass, consumed and reset by [`Agent::integrate`]. `alarm`
/// gates the attraction rule and decays linearly toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub position: Vec3,
    pub velocity: Vec3,
    pub delta_velocity: Vec3,
    pub alarm: f64,
}

impl Agent {
    #[must_use]
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position,
            velocity,
            delta_velocity: Vec3::ZERO,
            alarm: 0.0,
        }
    }

    /// Current speed (velocity norm).
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    /// Advances the agent by one explicit Euler step.
    ///
    /// Velocity integrates before position, the accumulated delta is cleared
    /// for the next pass, the position is re-wrapped into the periodic
    /// domain, and the alarm decays toward zero.
    pub fn integrate(&mut self, delta_t: f64, side: f64, alarm_decay_rate: f64) {
        self.velocity = self.velocity.add(self.delta_velocity.scale(delta_t));
        self.delta_velocity = Vec3::ZERO;
        self.position = self.position.add(self.velocity.scale(delta_t)).wrapped(side);
        self.alarm = (self.alarm - alarm_decay_rate * delta_t).max(0.0);
    }
}

/// Close-range gain `g`: grows as `body_length / distance` once two agents
/// sit closer than one body length, and is 1 beyond that.
#[must_use]
pub fn proximity_gain(distance: f64, body_length: f64) -> f64 {
    if distance <= body_length {
        body_length / distance
    } else {
        1.0
    }
}

/// Velocity correction relaxing the agent toward its cruising speed.
///
/// NaN for an agent with exactly zero velocity (no heading to scale); see
/// the crate docs on numeric degeneracies.
#[must_use]
pub fn self_propulsion(agent: &Agent, behavior: &BehaviorConfig) -> Vec3 {
    agent
        .velocity
        .scale(behavior.cruise_speed / agent.speed() - 1.0)
}

/// Orientation and repulsion contribution from the agent's repulsion zone.
///
/// Walks the sphere stencil offset by the agent's home cell. Occupants of
/// inner cells are accepted outright; occupants of boundary cells are
/// re-tested against the exact minimum-image distance, since the stencil
/// only proves their *cell* straddles the radius. Returns the count-averaged
/// delta and the neighbor count; an empty zone yields the zero vector and a
/// zero count.
#[must_use]
pub fn repulsion(
    agent: &Agent,
    agent_index: usize,
    school: &[Agent],
    behavior: &BehaviorConfig,
    grid: &CellGrid,
    stencil: &Stencil,
) -> (Vec3, usize) {
    let side = grid.side() as f64;
    let home = grid.cell_of(agent.position);
    let mut total = Vec3::ZERO;
    let mut neighbors = 0usize;

    let mut accumulate = |other: &Agent| {
        let displacement = min_image(agent.position, other.position, side);
        let distance = displacement.norm();
        let gain = proximity_gain(distance, behavior.body_length);
        let orientation = min_image(agent.velocity, other.velocity, side).scale(gain);
        let push = min_image(other.position, agent.position, side)
            .scale(behavior.repulsion_speed / distance)
            .sub(agent.velocity)
            .scale(gain);
        total = total.add(orientation).add(push);
        neighbors += 1;
    };

    for &offset in &stencil.inner {
        for &other in grid.offset_bucket(home, offset) {
            if other != agent_index {
                accumulate(&school[other]);
            }
        }
    }
    for &offset in &stencil.boundary {
        for &other in grid.offset_bucket(home, offset) {
            if other == agent_index {
                continue;
            }
            let candidate = &school[other];
            let distance = min_image(agent.position, candidate.position, side).norm();
            if distance <= behavior.repulsion_radius {
                accumulate(candidate);
            }
        }
    }

    if neighbors == 0 {
        (Vec3::ZERO, 0)
    } else {
        (total.div(neighbors as f64), neighbors)
    }
}

/// Attraction contribution from the annulus between the repulsion and
/// attraction radii, scaled by the agent's current alarm.
///
/// Inner-stencil occupants are already proven to lie in the annulus;
/// boundary-stencil occupants are re-tested against the exact distance
/// window. An agent with zero alarm contributes zero attraction regardless
/// of the neighbor count.
#[must_use]
pub fn attraction(
    agent: &Agent,
    agent_index: usize,
    school: &[Agent],
    behavior: &BehaviorConfig,
    grid: &CellGrid,
    stencil: &Stencil,
) -> (Vec3, usize) {
    let side = grid.side() as f64;
    let home = grid.cell_of(agent.position);
    let mut total = Vec3::ZERO;
    let mut neighbors = 0usize;

    let mut accumulate = |other: &Agent| {
        let displacement = min_image(agent.position, other.position, side);
        let distance = displacement.norm();
        let pull = displacement
            .scale(behavior.escape_speed / distance)
            .sub(agent.velocity);
        total = total.add(pull);
        neighbors += 1;
    };

    for &offset in &stencil.inner {
        for &other in grid.offset_bucket(home, offset) {
            if other != agent_index {
                accumulate(&school[other]);
            }
        }
    }
    for &offset in &stencil.boundary {
        for &other in grid.offset_bucket(home, offset) {
            if other == agent_index {
                continue;
            }
            let candidate = &school[other];
            let distance = min_image(agent.position, candidate.position, side).norm();
            if distance >= behavior.repulsion_radius && distance <= behavior.attraction_radius {
                accumulate(candidate);
            }
        }
    }

    if neighbors == 0 {
        (Vec3::ZERO, 0)
    } else {
        (total.div(neighbors as f64).scale(agent.alarm), neighbors)
    }
}

/// Summary of one completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    /// Steps completed so far, including this one.
    pub step: u64,
    /// Agents whose alarm is still positive after the step.
    pub alarmed: usize,
}

/// The full simulation state: agents, the per-step spatial index, and the
/// stencils precomputed from the two interaction radii.
#[derive(Debug, Clone)]
pub struct School {
    domain: DomainConfig,
    behavior: BehaviorConfig,
    agents: Vec<Agent>,
    grid: CellGrid,
    repulsion_stencil: Stencil,
    attraction_stencil: Stencil,
    frame: Vec<Agent>,
    positions: Vec<Vec3>,
    step: u64,
}

impl School {
    /// Validates the configuration, precomputes the stencils, and allocates
    /// the (initially empty) grid.
    pub fn new(domain: DomainConfig, behavior: BehaviorConfig) -> Result<Self, SchoolError> {
        domain.validate()?;
        behavior.validate(domain.domain_side)?;
        let grid = CellGrid::new(domain.domain_side)?;
        let repulsion_stencil = Stencil::sphere(behavior.repulsion_radius);
        let attraction_stencil =
            Stencil::annulus(behavior.repulsion_radius, behavior.attraction_radius);
        Ok(Self {
            domain,
            behavior,
            agents: Vec::new(),
            grid,
            repulsion_stencil,
            attraction_stencil,
            frame: Vec::new(),
            positions: Vec::new(),
            step: 0,
        })
    }

    /// Replaces the agent collection. Positions must lie inside the domain;
    /// the initial distribution's shape is the caller's business.
    pub fn set_agents(&mut self, agents: Vec<Agent>) {
        self.agents = agents;
    }

    #[must_use]
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    #[must_use]
    pub fn domain(&self) -> &DomainConfig {
        &self.domain
    }

    #[must_use]
    pub fn behavior(&self) -> &BehaviorConfig {
        &self.behavior
    }

    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step
    }

    #[must_use]
    pub fn repulsion_stencil(&self) -> &Stencil {
        &self.repulsion_stencil
    }

    #[must_use]
    pub fn attraction_stencil(&self) -> &Stencil {
        &self.attraction_stencil
    }

    /// Advances the school by one time step.
    ///
    /// Three barrier-separated phases: the grid is rebuilt exclusively, the
    /// accumulation pass runs in parallel over agents (reading a frozen
    /// frame of the school and writing only the agent's own slot), and the
    /// kinetic pass runs in parallel once every accumulation has finished.
    pub fn step(&mut self) -> StepReport {
        let side = self.grid.side() as f64;

        self.positions.clear();
        self.positions.extend(self.agents.iter().map(|a| a.position));
        self.grid.rebuild(&self.positions);

        self.frame.clone_from(&self.agents);
        let frame = &self.frame;
        let grid = &self.grid;
        let behavior = &self.behavior;
        let repulsion_stencil = &self.repulsion_stencil;
        let attraction_stencil = &self.attraction_stencil;

        self.agents
            .par_iter_mut()
            .enumerate()
            .for_each(|(index, agent)| {
                let propulsion = self_propulsion(agent, behavior);
                let (repelled, crowd) =
                    repulsion(agent, index, frame, behavior, grid, repulsion_stencil);
                if crowd < behavior.cohesion_threshold as usize {
                    agent.alarm = behavior.alarm_strength;
                }
                // The attraction stencil is the widest search; skip it
                // entirely while the agent is calm.
                agent.delta_velocity = if agent.alarm > 0.0 {
                    let (attracted, _) =
                        attraction(agent, index, frame, behavior, grid, attraction_stencil);
                    propulsion.add(repelled).add(attracted)
                } else {
                    propulsion.add(repelled)
                };
            });

        let delta_t = self.domain.delta_t;
        let decay = self.behavior.alarm_decay_rate();
        self.agents
            .par_iter_mut()
            .for_each(|agent| agent.integrate(delta_t, side, decay));

        self.step += 1;
        let alarmed = self.agents.iter().filter(|a| a.alarm > 0.0).count();
        StepReport {
            step: self.step,
            alarmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_behavior() -> BehaviorConfig {
        BehaviorConfig {
            cruise_speed: 1.0,
            repulsion_speed: 1.0,
            escape_speed: 7.5,
            body_length: 1.0,
            repulsion_radius: 1.0,
            attraction_radius: 7.5,
            cohesion_threshold: 3,
            alarm_strength: 10.0,
            alarm_duration: 0.1,
        }
    }

    fn grid_with(side: u32, agents: &[Agent]) -> CellGrid {
        let mut grid = CellGrid::new(side).expect("grid");
        let positions: Vec<Vec3> = agents.iter().map(|a| a.position).collect();
        grid.rebuild(&positions);
        grid
    }

    #[test]
    fn proximity_gain_decays_to_unity() {
        assert_eq!(proximity_gain(0.5, 1.0), 2.0);
        assert_eq!(proximity_gain(1.0, 1.0), 1.0);
        assert_eq!(proximity_gain(1.5, 1.0), 1.0);
        assert_eq!(proximity_gain(0.5, 0.5), 1.0);
    }

    #[test]
    fn self_propulsion_relaxes_toward_cruise_speed() {
        let agent = Agent::new(Vec3::ZERO, Vec3::new(0.5, 0.6, 0.7));
        let behavior = test_behavior();
        let speed = (0.5f64 * 0.5 + 0.6 * 0.6 + 0.7 * 0.7).sqrt();
        assert_eq!(agent.speed(), speed);

        let delta = self_propulsion(&agent, &behavior);
        assert_eq!(delta.x, (1.0 / speed - 1.0) * 0.5);
        assert_eq!(delta.y, (1.0 / speed - 1.0) * 0.6);
        assert_eq!(delta.z, (1.0 / speed - 1.0) * 0.7);
    }

    #[test]
    fn repulsion_pushes_close_pairs_apart_symmetrically() {
        let behavior = BehaviorConfig {
            repulsion_radius: 0.5,
            ..test_behavior()
        };
        let agents = vec![
            Agent::new(Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0)),
            Agent::new(Vec3::new(0.5, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
        ];
        let grid = grid_with(32, &agents);
        let stencil = Stencil::sphere(behavior.repulsion_radius);
        assert!(stencil.inner.is_empty());

        let (delta_a, count_a) = repulsion(&agents[0], 0, &agents, &behavior, &grid, &stencil);
        let (delta_b, count_b) = repulsion(&agents[1], 1, &agents, &behavior, &grid, &stencil);
        assert_eq!(count_a, 1);
        assert_eq!(count_b, 1);

        assert_eq!(delta_a.x, -2.0);
        assert_eq!(delta_a.y, -2.0);
        assert_eq!(delta_a.z, 0.0);
        assert_eq!(delta_b.x, 2.0);
        assert_eq!(delta_b.y, -2.0);
        assert_eq!(delta_b.z, 0.0);
    }

    #[test]
    fn attraction_pulls_isolated_pairs_together() {
        let behavior = BehaviorConfig {
            repulsion_radius: 4.0,
            ..test_behavior()
        };
        let mut agents = vec![
            Agent::new(Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0)),
            Agent::new(Vec3::new(5.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
        ];
        agents[0].alarm = 3.0;
        agents[1].alarm = 3.0;
        let grid = grid_with(32, &agents);
        let stencil = Stencil::annulus(behavior.repulsion_radius, behavior.attraction_radius);

        let (delta_a, count_a) = attraction(&agents[0], 0, &agents, &behavior, &grid, &stencil);
        let (delta_b, count_b) = attraction(&agents[1], 1, &agents, &behavior, &grid, &stencil);
        assert_eq!(count_a, 1);
        assert_eq!(count_b, 1);

        assert!((delta_a.x - 22.5).abs() < 1e-12);
        assert!((delta_b.x + 22.5).abs() < 1e-12);
        assert!((delta_a.y + 3.0).abs() < 1e-12);
        assert_eq!(delta_a.y, delta_b.y);
        assert_eq!(delta_a.z, 0.0);
        assert_eq!(delta_b.z, 0.0);
    }

    #[test]
    fn attraction_is_gated_by_alarm() {
        let behavior = BehaviorConfig {
            repulsion_radius: 4.0,
            ..test_behavior()
        };
        let agents = vec![
            Agent::new(Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0)),
            Agent::new(Vec3::new(5.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
        ];
        let grid = grid_with(32, &agents);
        let stencil = Stencil::annulus(behavior.repulsion_radius, behavior.attraction_radius);

        let (delta, count) = attraction(&agents[0], 0, &agents, &behavior, &grid, &stencil);
        assert_eq!(count, 1);
        assert_eq!(delta, Vec3::ZERO);
    }

    #[test]
    fn lone_agent_sees_no_neighbors() {
        let behavior = BehaviorConfig {
            repulsion_radius: 4.0,
            ..test_behavior()
        };
        let mut agent = Agent::new(Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0));
        agent.alarm = 1.0;
        let agents = vec![agent];
        let grid = grid_with(32, &agents);

        let repulsion_stencil = Stencil::sphere(behavior.repulsion_radius);
        let (delta, count) = repulsion(&agents[0], 0, &agents, &behavior, &grid, &repulsion_stencil);
        assert_eq!(count, 0);
        assert_eq!(delta, Vec3::ZERO);

        let attraction_stencil =
            Stencil::annulus(behavior.repulsion_radius, behavior.attraction_radius);
        let (delta, count) =
            attraction(&agents[0], 0, &agents, &behavior, &grid, &attraction_stencil);
        assert_eq!(count, 0);
        assert_eq!(delta, Vec3::ZERO);
    }

    #[test]
    fn neighbors_are_found_across_the_periodic_seam() {
        let behavior = BehaviorConfig {
            attraction_radius: 4.0,
            ..test_behavior()
        };
        let agents = vec![
            Agent::new(Vec3::new(9.75, 5.0, 5.0), Vec3::new(0.0, 1.0, 0.0)),
            Agent::new(Vec3::new(0.25, 5.0, 5.0), Vec3::new(0.0, 1.0, 0.0)),
        ];
        let grid = grid_with(10, &agents);
        let stencil = Stencil::sphere(behavior.repulsion_radius);

        let (_, count_a) = repulsion(&agents[0], 0, &agents, &behavior, &grid, &stencil);
        let (_, count_b) = repulsion(&agents[1], 1, &agents, &behavior, &grid, &stencil);
        assert_eq!(count_a, 1, "seam neighbor at true distance 0.5 missed");
        assert_eq!(count_b, 1);
    }

    #[test]
    fn integrate_orders_velocity_before_position() {
        let mut agent = Agent::new(Vec3::ZERO, Vec3::ZERO);
        agent.delta_velocity = Vec3::new(1.0, 0.0, 0.0);
        agent.integrate(0.5, 10.0, 0.0);
        assert_eq!(agent.velocity, Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(agent.position, Vec3::new(0.25, 0.0, 0.0));
        assert_eq!(agent.delta_velocity, Vec3::ZERO);
    }

    #[test]
    fn integrate_wraps_and_decays_alarm() {
        let mut agent = Agent::new(Vec3::new(0.0, 9.95, 0.0), Vec3::new(0.0, 1.0, 0.0));
        agent.alarm = 0.5;
        agent.integrate(0.1, 10.0, 2.0);
        assert_eq!(agent.velocity, Vec3::new(0.0, 1.0, 0.0));
        assert!((agent.position.y - 0.05).abs() < 1e-12);
        assert!((agent.alarm - 0.3).abs() < 1e-12);

        agent.alarm = 0.1;
        agent.integrate(0.1, 10.0, 2.0);
        assert_eq!(agent.alarm, 0.0);
    }

    #[test]
    fn config_validation_rejects_bad_records() {
        let domain = DomainConfig::default();
        assert!(domain.validate().is_ok());
        assert!(
            DomainConfig {
                domain_side: 0,
                ..domain.clone()
            }
            .validate()
            .is_err()
        );
        assert!(
            DomainConfig {
                delta_t: 0.0,
                ..domain.clone()
            }
            .validate()
            .is_err()
        );
        assert!(
            DomainConfig {
                snapshot_interval: 0,
                ..domain
            }
            .validate()
            .is_err()
        );

        let behavior = BehaviorConfig::default();
        assert!(behavior.validate(32).is_ok());
        assert!(
            BehaviorConfig {
                attraction_radius: 0.5,
                ..behavior.clone()
            }
            .validate(32)
            .is_err(),
            "attraction radius must exceed repulsion radius"
        );
        assert!(
            BehaviorConfig {
                repulsion_radius: -1.0,
                ..behavior.clone()
            }
            .validate(32)
            .is_err()
        );
        assert!(
            behavior.validate(10).is_err(),
            "domain must span twice the attraction radius"
        );
    }

    #[test]
    fn step_raises_alarm_on_sparse_neighborhoods() {
        let domain = DomainConfig {
            domain_side: 32,
            agent_count: 2,
            delta_t: 0.1,
            ..DomainConfig::default()
        };
        let behavior = BehaviorConfig {
            alarm_duration: 1.0,
            ..test_behavior()
        };
        let decay = behavior.alarm_decay_rate();
        let mut school = School::new(domain, behavior).expect("school");
        school.set_agents(vec![
            Agent::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(0.0, 1.0, 0.0)),
            Agent::new(Vec3::new(1.5, 1.0, 1.0), Vec3::new(0.0, 1.0, 0.0)),
        ]);

        let report = school.step();
        assert_eq!(report.step, 1);
        assert_eq!(report.alarmed, 2);
        for agent in school.agents() {
            // Raised to full strength during the pass, then decayed once.
            assert!((agent.alarm - (10.0 - decay * 0.1)).abs() < 1e-9);
            assert_eq!(agent.delta_velocity, Vec3::ZERO);
        }
    }

    #[test]
    fn step_leaves_crowded_agents_calm() {
        let domain = DomainConfig {
            domain_side: 32,
            agent_count: 2,
            ..DomainConfig::default()
        };
        let behavior = BehaviorConfig {
            cohesion_threshold: 1,
            ..test_behavior()
        };
        let mut school = School::new(domain, behavior).expect("school");
        school.set_agents(vec![
            Agent::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(0.0, 1.0, 0.0)),
            Agent::new(Vec3::new(1.5, 1.0, 1.0), Vec3::new(0.0, 1.0, 0.0)),
        ]);

        let report = school.step();
        assert_eq!(report.alarmed, 0);
        for agent in school.agents() {
            assert_eq!(agent.alarm, 0.0);
        }
    }

    #[test]
    fn school_rejects_undersized_domains() {
        let domain = DomainConfig {
            domain_side: 10,
            ..DomainConfig::default()
        };
        assert!(matches!(
            School::new(domain, BehaviorConfig::default()),
            Err(SchoolError::InvalidConfig(_))
        ));
    }
}
