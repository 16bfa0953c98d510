//! Driver glue around `shoal-core`: configuration files, initial placement
//! policies, the run loop, and the flat snapshot writer.

use anyhow::{Context, Result};
use clap::ValueEnum;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use shoal_core::{Agent, BehaviorConfig, DomainConfig, School, Vec3};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// On-disk configuration: the domain/run record and the behavior record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub domain: DomainConfig,
    pub behavior: BehaviorConfig,
}

/// Loads and parses a JSON configuration file.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

/// Shape of the initial agent distribution. The core places no constraint on
/// it; these are the two policies the driver offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InitPolicy {
    /// Positions uniform over the whole domain.
    Uniform,
    /// Positions uniform inside a sphere around the domain center.
    Cluster,
}

/// Draws the initial agent collection. Velocities are uniform in
/// `[-cruise_speed, cruise_speed]` per axis under both policies.
pub fn place_agents(
    policy: InitPolicy,
    domain: &DomainConfig,
    behavior: &BehaviorConfig,
    rng: &mut SmallRng,
) -> Vec<Agent> {
    let side = f64::from(domain.domain_side);
    let cruise = behavior.cruise_speed;
    (0..domain.agent_count)
        .map(|_| {
            let position = match policy {
                InitPolicy::Uniform => Vec3::new(
                    rng.random_range(0.0..side),
                    rng.random_range(0.0..side),
                    rng.random_range(0.0..side),
                ),
                InitPolicy::Cluster => cluster_position(side, rng),
            };
            let velocity = Vec3::new(
                rng.random_range(-cruise..cruise),
                rng.random_range(-cruise..cruise),
                rng.random_range(-cruise..cruise),
            );
            Agent::new(position, velocity)
        })
        .collect()
}

/// Rejection-samples a point inside a sphere of radius `side / 8` centered
/// in the domain.
fn cluster_position(side: f64, rng: &mut SmallRng) -> Vec3 {
    let radius = side / 8.0;
    let center = side / 2.0;
    loop {
        let offset = Vec3::new(
            rng.random_range(-radius..radius),
            rng.random_range(-radius..radius),
            rng.random_range(-radius..radius),
        );
        if offset.norm() <= radius {
            return Vec3::new(center + offset.x, center + offset.y, center + offset.z);
        }
    }
}

/// Serializes agent snapshots as whitespace-separated text: one agent per
/// line, `x y z vx vy vz`, frames appended back to back.
pub struct SnapshotWriter<W: Write> {
    out: W,
}

impl SnapshotWriter<BufWriter<File>> {
    /// Creates (truncating) the output file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("creating output file {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> SnapshotWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Appends one frame, in the agent collection's iteration order.
    pub fn write_frame(&mut self, agents: &[Agent]) -> Result<()> {
        for agent in agents {
            let p = agent.position;
            let v = agent.velocity;
            writeln!(self.out, "{} {} {} {} {} {}", p.x, p.y, p.z, v.x, v.y, v.z)?;
        }
        Ok(())
    }

    /// Flushes buffered frames and returns the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Everything `run` needs, already parsed.
pub struct RunOptions {
    pub config: ConfigFile,
    pub init: InitPolicy,
    pub output: PathBuf,
}

/// Builds the school, runs the configured number of steps, and dumps a
/// snapshot every `snapshot_interval` steps.
pub fn run(options: RunOptions) -> Result<()> {
    let ConfigFile { domain, behavior } = options.config;

    let mut rng = match domain.rng_seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_os_rng(),
    };
    let agents = place_agents(options.init, &domain, &behavior, &mut rng);

    let max_steps = domain.max_steps;
    let snapshot_interval = domain.snapshot_interval;
    let mut school = School::new(domain, behavior)?;
    school.set_agents(agents);

    info!(
        agents = school.agents().len(),
        side = school.domain().domain_side,
        steps = max_steps,
        repulsion_cells = school.repulsion_stencil().boundary.len()
            + school.repulsion_stencil().inner.len(),
        attraction_cells = school.attraction_stencil().boundary.len()
            + school.attraction_stencil().inner.len(),
        "starting schooling run"
    );

    let mut writer = SnapshotWriter::create(&options.output)?;
    for step in 0..max_steps {
        let report = school.step();
        debug!(step = report.step, alarmed = report.alarmed, "advanced step");
        if step % snapshot_interval == 0 {
            writer.write_frame(school.agents())?;
        }
    }
    writer.finish()?;

    info!(output = %options.output.display(), "run complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ConfigFile {
        serde_json::from_str(
            r#"{
                "domain": {
                    "domain_side": 16,
                    "agent_count": 8,
                    "max_steps": 100,
                    "delta_t": 0.1,
                    "snapshot_interval": 10,
                    "rng_seed": 7
                },
                "behavior": {
                    "cruise_speed": 1.0,
                    "repulsion_speed": 1.0,
                    "escape_speed": 7.5,
                    "body_length": 1.0,
                    "repulsion_radius": 1.0,
                    "attraction_radius": 7.5,
                    "cohesion_threshold": 3,
                    "alarm_strength": 10.0,
                    "alarm_duration": 0.1
                }
            }"#,
        )
        .expect("config parses")
    }

    #[test]
    fn config_file_round_trips() {
        let config = sample_config();
        assert_eq!(config.domain.domain_side, 16);
        assert_eq!(config.domain.rng_seed, Some(7));
        assert_eq!(config.behavior.cohesion_threshold, 3);

        let encoded = serde_json::to_string(&config).expect("encode");
        let decoded: ConfigFile = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded.behavior.escape_speed, config.behavior.escape_speed);
    }

    #[test]
    fn uniform_placement_fills_the_domain_shape() {
        let config = sample_config();
        let mut rng = SmallRng::seed_from_u64(42);
        let agents = place_agents(InitPolicy::Uniform, &config.domain, &config.behavior, &mut rng);
        assert_eq!(agents.len(), config.domain.agent_count);
        for agent in &agents {
            for coord in [agent.position.x, agent.position.y, agent.position.z] {
                assert!((0.0..16.0).contains(&coord));
            }
            assert_eq!(agent.alarm, 0.0);
            assert_eq!(agent.delta_velocity, Vec3::ZERO);
        }
    }

    #[test]
    fn cluster_placement_stays_near_the_center() {
        let config = sample_config();
        let mut rng = SmallRng::seed_from_u64(42);
        let agents = place_agents(InitPolicy::Cluster, &config.domain, &config.behavior, &mut rng);
        let center = Vec3::new(8.0, 8.0, 8.0);
        for agent in &agents {
            assert!(agent.position.sub(center).norm() <= 2.0 + 1e-12);
        }
    }

    #[test]
    fn snapshot_frames_are_whitespace_separated_rows() {
        let agents = vec![
            Agent::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.5, -0.5, 0.25)),
            Agent::new(Vec3::new(4.0, 5.0, 6.0), Vec3::ZERO),
        ];
        let mut writer = SnapshotWriter::new(Vec::new());
        writer.write_frame(&agents).expect("frame");
        let out = writer.finish().expect("flush");
        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(text, "1 2 3 0.5 -0.5 0.25\n4 5 6 0 0 0\n");
    }
}
