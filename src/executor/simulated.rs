//! Grid-walking robot simulator.
//!
//! Each robot is an actor: one tokio task owns the queue and the live
//! position and is driven by a command channel. Steps are applied between
//! command batches, so a cancel or position query never observes half a
//! step.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use super::{ExecutorConfig, RobotExecutor, Submission, TaskEvent, deadline_after};
use crate::errors::ExecutorError;
use crate::grid::Position;
use crate::plan::Plan;
use crate::task::{RobotId, TaskId};

const COMMAND_BUFFER: usize = 64;

enum Command {
    Submit {
        plan: Plan,
        reply: oneshot::Sender<Result<Submission, ExecutorError>>,
    },
    Cancel {
        task_id: TaskId,
        reply: oneshot::Sender<Result<(), ExecutorError>>,
    },
    Position {
        reply: oneshot::Sender<Position>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a simulated robot's worker.
///
/// Dropping every handle stops the worker; queued tasks then fail with
/// `executor stopped`.
pub struct SimulatedRobot {
    id: RobotId,
    commands: mpsc::Sender<Command>,
}

impl SimulatedRobot {
    /// Start a worker for robot `id` standing at `start`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(id: impl Into<RobotId>, start: Position, config: ExecutorConfig) -> Self {
        let id = id.into();
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let worker = Worker {
            robot_id: id.clone(),
            config,
            position: start,
            issued: 0,
            queue: VecDeque::new(),
            current: None,
            commands: rx,
        };
        tokio::spawn(worker.run());
        Self { id, commands: tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ExecutorError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| ExecutorError::Stopped)?;
        response.await.map_err(|_| ExecutorError::Stopped)
    }
}

#[async_trait]
impl RobotExecutor for SimulatedRobot {
    fn id(&self) -> &str {
        &self.id
    }

    async fn submit(&self, plan: Plan) -> Result<Submission, ExecutorError> {
        self.request(|reply| Command::Submit { plan, reply }).await?
    }

    async fn cancel(&self, task_id: &str) -> Result<(), ExecutorError> {
        let task_id = task_id.to_string();
        self.request(|reply| Command::Cancel { task_id, reply })
            .await?
    }

    async fn position(&self) -> Result<Position, ExecutorError> {
        self.request(|reply| Command::Position { reply }).await
    }

    async fn shutdown(&self) {
        if self
            .request(|reply| Command::Shutdown { reply })
            .await
            .is_err()
        {
            debug!(robot_id = %self.id, "robot worker already stopped");
        }
    }
}

struct QueuedTask {
    id: TaskId,
    plan: Plan,
    events: mpsc::UnboundedSender<TaskEvent>,
}

impl QueuedTask {
    fn emit(&self, event: TaskEvent) {
        // The receiver may be gone; the task still runs to keep the robot's
        // position consistent.
        let _ = self.events.send(event);
    }
}

struct RunningTask {
    task: QueuedTask,
    next_step: usize,
    deadline: Instant,
}

struct Worker {
    robot_id: RobotId,
    config: ExecutorConfig,
    position: Position,
    issued: u64,
    queue: VecDeque<QueuedTask>,
    current: Option<RunningTask>,
    commands: mpsc::Receiver<Command>,
}

impl Worker {
    async fn run(mut self) {
        info!(robot_id = %self.robot_id, position = %self.position, "robot worker started");
        let mut shutdown_reply = None;

        loop {
            self.start_next();

            let deadline = self.current.as_ref().map(|running| running.deadline);
            let tick = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Some(reply) = self.handle(command) {
                            shutdown_reply = Some(reply);
                            break;
                        }
                    }
                    None => break,
                },
                () = tick => self.advance(),
            }
        }

        self.fail_remaining("executor stopped");
        info!(robot_id = %self.robot_id, position = %self.position, "robot worker stopped");
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    /// Apply a command; returns the reply handle when asked to shut down.
    fn handle(&mut self, command: Command) -> Option<oneshot::Sender<()>> {
        match command {
            Command::Submit { plan, reply } => {
                let _ = reply.send(self.accept(plan));
            }
            Command::Cancel { task_id, reply } => {
                let _ = reply.send(self.cancel(&task_id));
            }
            Command::Position { reply } => {
                let _ = reply.send(self.position);
            }
            Command::Shutdown { reply } => return Some(reply),
        }
        None
    }

    fn held(&self) -> usize {
        self.queue.len() + usize::from(self.current.is_some())
    }

    fn accept(&mut self, plan: Plan) -> Result<Submission, ExecutorError> {
        if self.held() >= self.config.capacity {
            warn!(
                robot_id = %self.robot_id,
                capacity = self.config.capacity,
                "task queue full, rejecting plan"
            );
            return Err(ExecutorError::QueueFull {
                capacity: self.config.capacity,
            });
        }

        self.issued += 1;
        let task_id = format!("task_{}_{}", self.robot_id, self.issued);
        let (events, receiver) = mpsc::unbounded_channel();
        debug!(robot_id = %self.robot_id, task_id = %task_id, commands = %plan, "plan queued");
        self.queue.push_back(QueuedTask {
            id: task_id.clone(),
            plan,
            events,
        });

        Ok(Submission {
            task_id,
            events: receiver,
        })
    }

    fn cancel(&mut self, task_id: &str) -> Result<(), ExecutorError> {
        if self
            .current
            .as_ref()
            .is_some_and(|running| running.task.id == task_id)
        {
            if let Some(running) = self.current.take() {
                info!(
                    robot_id = %self.robot_id,
                    task_id,
                    step = running.next_step,
                    position = %self.position,
                    "running task cancelled"
                );
                running.task.emit(TaskEvent::Cancelled);
            }
            return Ok(());
        }

        if let Some(index) = self.queue.iter().position(|task| task.id == task_id) {
            if let Some(task) = self.queue.remove(index) {
                info!(robot_id = %self.robot_id, task_id, "queued task cancelled");
                task.emit(TaskEvent::Cancelled);
            }
            return Ok(());
        }

        if self.was_issued(task_id) {
            Err(ExecutorError::AlreadyTerminal {
                task_id: task_id.to_string(),
            })
        } else {
            Err(ExecutorError::NotFound {
                task_id: task_id.to_string(),
            })
        }
    }

    /// Whether `task_id` is one this robot handed out earlier.
    fn was_issued(&self, task_id: &str) -> bool {
        task_id
            .strip_prefix("task_")
            .and_then(|rest| rest.strip_prefix(self.robot_id.as_str()))
            .and_then(|rest| rest.strip_prefix('_'))
            .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|n| n.parse::<u64>().ok())
            .is_some_and(|n| n >= 1 && n <= self.issued)
    }

    fn start_next(&mut self) {
        while self.current.is_none() {
            let Some(task) = self.queue.pop_front() else {
                return;
            };

            info!(
                robot_id = %self.robot_id,
                task_id = %task.id,
                commands = %task.plan,
                position = %self.position,
                "task started"
            );
            task.emit(TaskEvent::Position {
                position: self.position,
            });

            if task.plan.is_empty() {
                task.emit(TaskEvent::Completed);
                continue;
            }

            self.current = Some(RunningTask {
                task,
                next_step: 0,
                deadline: deadline_after(self.config.step_delay),
            });
        }
    }

    fn advance(&mut self) {
        let Some(mut running) = self.current.take() else {
            return;
        };
        let Some(direction) = running.task.plan.get(running.next_step) else {
            running.task.emit(TaskEvent::Completed);
            return;
        };

        let Some(next) = self.config.grid.step(self.position, direction) else {
            let message = format!(
                "command '{}' at step {} would move the robot out of bounds from {}",
                direction.as_char(),
                running.next_step + 1,
                self.position
            );
            warn!(robot_id = %self.robot_id, task_id = %running.task.id, "{message}");
            running.task.emit(TaskEvent::Failed { message });
            return;
        };

        self.position = next;
        running.next_step += 1;
        running.task.emit(TaskEvent::Position { position: next });

        if running.next_step == running.task.plan.len() {
            info!(
                robot_id = %self.robot_id,
                task_id = %running.task.id,
                position = %self.position,
                "task completed"
            );
            running.task.emit(TaskEvent::Completed);
        } else {
            running.deadline = deadline_after(self.config.step_delay);
            self.current = Some(running);
        }
    }

    fn fail_remaining(&mut self, reason: &str) {
        let current = self.current.take().map(|running| running.task);
        for task in current.into_iter().chain(self.queue.drain(..)) {
            warn!(robot_id = %self.robot_id, task_id = %task.id, reason, "task aborted");
            task.emit(TaskEvent::Failed {
                message: reason.to_string(),
            });
        }
    }
}
