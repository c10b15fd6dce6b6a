//! Scripted in-memory gateway for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::credentials::GatewayCredentials;
use crate::error::GatewayError;
use crate::gateway::{
    GatewayFactory, GatewaySession, QrPoll, SessionGateway, SessionIdentity, SessionStatus,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Get(String),
    Create(String),
    Delete(String),
    Qr(String),
}

/// One scripted `get_session` answer.
#[derive(Debug, Clone)]
pub(crate) enum Lookup {
    Absent,
    Status(&'static str),
    Identified {
        status: &'static str,
        id: &'static str,
        push_name: Option<&'static str>,
    },
    Fail,
}

/// One scripted `get_qr_code` answer.
#[derive(Debug, Clone)]
pub(crate) enum QrStep {
    Ready(&'static [u8]),
    NotReady(u16),
    Fail,
}

struct Script {
    lookups: VecDeque<Lookup>,
    create: Option<&'static str>,
    delete_fails: bool,
    qr: VecDeque<QrStep>,
    calls: Vec<Call>,
}

/// Answers from queues; the last entry of each queue repeats forever.
pub(crate) struct ScriptedGateway {
    script: Mutex<Script>,
}

fn failure(operation: &'static str, name: &str) -> GatewayError {
    GatewayError::RequestFailed {
        operation,
        session: name.to_string(),
        reason: "scripted failure".to_string(),
    }
}

fn next<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

impl ScriptedGateway {
    pub(crate) fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                lookups: VecDeque::from([Lookup::Absent]),
                create: Some("STARTING"),
                delete_fails: false,
                qr: VecDeque::from([QrStep::NotReady(404)]),
                calls: Vec::new(),
            }),
        }
    }

    pub(crate) fn with_lookups(self, lookups: impl IntoIterator<Item = Lookup>) -> Self {
        self.script.lock().unwrap().lookups = lookups.into_iter().collect();
        self
    }

    /// `None` makes creation fail.
    pub(crate) fn with_create(self, status: Option<&'static str>) -> Self {
        self.script.lock().unwrap().create = status;
        self
    }

    pub(crate) fn with_failing_delete(self) -> Self {
        self.script.lock().unwrap().delete_fails = true;
        self
    }

    pub(crate) fn with_qr(self, steps: impl IntoIterator<Item = QrStep>) -> Self {
        self.script.lock().unwrap().qr = steps.into_iter().collect();
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub(crate) fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }
}

#[async_trait]
impl SessionGateway for ScriptedGateway {
    async fn get_session(&self, name: &str) -> Result<Option<GatewaySession>, GatewayError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call::Get(name.to_string()));
        match next(&mut script.lookups).unwrap_or(Lookup::Absent) {
            Lookup::Absent => Ok(None),
            Lookup::Status(status) => Ok(Some(GatewaySession {
                name: name.to_string(),
                status: SessionStatus::parse(status),
                identity: None,
            })),
            Lookup::Identified {
                status,
                id,
                push_name,
            } => Ok(Some(GatewaySession {
                name: name.to_string(),
                status: SessionStatus::parse(status),
                identity: Some(SessionIdentity {
                    id: id.to_string(),
                    push_name: push_name.map(str::to_string),
                }),
            })),
            Lookup::Fail => Err(failure("get_session", name)),
        }
    }

    async fn create_session(&self, name: &str) -> Result<GatewaySession, GatewayError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call::Create(name.to_string()));
        match script.create {
            Some(status) => Ok(GatewaySession {
                name: name.to_string(),
                status: SessionStatus::parse(status),
                identity: None,
            }),
            None => Err(failure("create_session", name)),
        }
    }

    async fn delete_session(&self, name: &str) -> Result<(), GatewayError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call::Delete(name.to_string()));
        if script.delete_fails {
            Err(failure("delete_session", name))
        } else {
            Ok(())
        }
    }

    async fn get_qr_code(&self, name: &str) -> Result<QrPoll, GatewayError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call::Qr(name.to_string()));
        match next(&mut script.qr).unwrap_or(QrStep::NotReady(404)) {
            QrStep::Ready(bytes) => Ok(QrPoll::Ready(Bytes::from_static(bytes))),
            QrStep::NotReady(status) => Ok(QrPoll::NotReady { status }),
            QrStep::Fail => Err(failure("get_qr_code", name)),
        }
    }
}

/// Hands out the same scripted gateway for any credentials.
pub(crate) struct ScriptedFactory {
    pub(crate) gateway: Arc<ScriptedGateway>,
    pub(crate) seen_base_urls: Mutex<Vec<String>>,
}

impl ScriptedFactory {
    pub(crate) fn new(gateway: Arc<ScriptedGateway>) -> Self {
        Self {
            gateway,
            seen_base_urls: Mutex::new(Vec::new()),
        }
    }
}

impl GatewayFactory for ScriptedFactory {
    fn gateway(
        &self,
        credentials: &GatewayCredentials,
    ) -> Result<Arc<dyn SessionGateway>, GatewayError> {
        self.seen_base_urls
            .lock()
            .unwrap()
            .push(credentials.base_url.clone());
        Ok(self.gateway.clone())
    }
}
