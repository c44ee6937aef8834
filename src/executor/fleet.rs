use std::sync::Arc;

use super::{ExecutorConfig, RobotExecutor, SimulatedRobot};
use crate::grid::Position;

/// The fixed list of robots. A robot's ID is its index in the list.
#[derive(Clone, Default)]
pub struct Fleet {
    robots: Vec<Arc<dyn RobotExecutor>>,
}

impl Fleet {
    pub fn new(robots: Vec<Arc<dyn RobotExecutor>>) -> Self {
        Self { robots }
    }

    /// Spawn `count` simulated robots, all starting at the origin.
    pub fn simulated(count: usize, config: ExecutorConfig) -> Self {
        let robots = (0..count)
            .map(|index| {
                Arc::new(SimulatedRobot::spawn(
                    index.to_string(),
                    Position::origin(),
                    config,
                )) as Arc<dyn RobotExecutor>
            })
            .collect();
        Self { robots }
    }

    /// Look a robot up by its decimal index.
    pub fn resolve(&self, robot_id: &str) -> Option<Arc<dyn RobotExecutor>> {
        let index: usize = robot_id.parse().ok()?;
        self.robots.get(index).cloned()
    }

    pub fn robots(&self) -> &[Arc<dyn RobotExecutor>] {
        &self.robots
    }

    pub fn len(&self) -> usize {
        self.robots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.robots.is_empty()
    }

    /// Shut every robot down in turn.
    pub async fn shutdown(&self) {
        for robot in &self.robots {
            robot.shutdown().await;
        }
    }
}
