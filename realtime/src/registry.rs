use crate::message::{ChangeEvent, Payload, ProjectId, RegistryStats, SessionId};
use crate::session::Session;
use log::*;
use std::collections::HashMap;
use tokio::sync::mpsc::{error::TrySendError, Sender};

/// Outcome of routing one change event.
#[derive(Debug, PartialEq)]
pub enum Delivery {
    /// No session is registered under the event's project; the event is dropped.
    NoSubscribers,
    Delivered {
        /// Sessions that accepted the payload.
        delivered: usize,
        /// Sessions removed because their outbound queue was full or closed.
        evicted: Vec<SessionId>,
    },
}

/// Session registry with dual indices, owned by the hub control loop.
///
/// The loop is the only writer, so the maps need no locking of their own. Each
/// membership holds the only `Sender` of its session's outbound queue: dropping
/// the entry is what closes the queue.
#[derive(Default)]
pub struct Registry {
    /// Primary storage: which project a session belongs to.
    sessions: HashMap<SessionId, ProjectId>,

    /// Secondary index: routing from project to its members' outbound queues.
    projects: HashMap<ProjectId, HashMap<SessionId, Sender<Payload>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to its project's set. Returns `false` if the session id is
    /// already registered, in which case nothing changes.
    pub fn register(&mut self, session: Session) -> bool {
        let Session {
            id,
            project,
            sender,
        } = session;

        if self.sessions.contains_key(&id) {
            return false;
        }

        self.projects
            .entry(project.clone())
            .or_default()
            .insert(id.clone(), sender);
        self.sessions.insert(id, project);

        true
    }

    /// Remove a session and close its outbound queue. Returns `false` if the
    /// session was not registered.
    pub fn unregister(&mut self, id: &SessionId) -> bool {
        let Some(project) = self.sessions.remove(id) else {
            return false;
        };

        if let Some(members) = self.projects.get_mut(&project) {
            // Dropping the sender closes the queue
            members.remove(id);

            // Clean up empty project entries
            if members.is_empty() {
                self.projects.remove(&project);
            }
        }

        true
    }

    /// Offer the event's payload to every session of its project without waiting.
    ///
    /// A session whose queue is full cannot keep up and is evicted on the spot,
    /// as is a session whose writer has already gone away.
    pub fn publish(&mut self, event: &ChangeEvent) -> Delivery {
        let Some(members) = self.projects.get_mut(&event.project) else {
            return Delivery::NoSubscribers;
        };

        let mut evicted = Vec::new();
        members.retain(|id, sender| match sender.try_send(event.payload.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Outbound queue full for session {} in project {}, evicting slow consumer",
                    id, event.project
                );
                evicted.push(id.clone());
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    "Outbound queue already closed for session {} in project {}, removing",
                    id, event.project
                );
                evicted.push(id.clone());
                false
            }
        });

        let delivered = members.len();
        if members.is_empty() {
            self.projects.remove(&event.project);
        }
        for id in &evicted {
            self.sessions.remove(id);
        }

        Delivery::Delivered { delivered, evicted }
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn project_of(&self, id: &SessionId) -> Option<&ProjectId> {
        self.sessions.get(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            sessions: self.sessions.len(),
            projects: self
                .projects
                .iter()
                .map(|(project, members)| (project.clone(), members.len()))
                .collect(),
        }
    }
}
