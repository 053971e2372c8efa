//! Employee time tracking.
//!
//! A login at one terminal while the employee is still logged in at another
//! forces a logout there: the plugin emits an `EMPLOYEE_LOGOUT` for the old
//! terminal, which comes back through dispatch and closes that session.

use std::sync::Arc;

use async_trait::async_trait;
use posflow_engine::{
    decode_payload, CancellationToken, ConfigError, ConfigMap, Outcome, Plugin, PluginError,
    PluginState,
};
use posflow_events::{Event, EventKind};
use posflow_store::{PosStore, Write};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::support::{bool_or, guarded, validate, Accepts};

pub const NAME: &str = "employee_time_tracker";

const AUTO_LOGOUT: &str = "auto_logout";
const AUTO_LOGOUT_REASON: &str = "Login detected at different terminal";

#[derive(Debug, Deserialize)]
struct Login {
    employee_id: String,
    terminal_id: String,
    #[serde(default)]
    store_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Logout {
    employee_id: String,
    terminal_id: String,
}

pub struct EmployeeTracker {
    state: PluginState,
    store: Arc<dyn PosStore>,
}

impl EmployeeTracker {
    pub fn new(store: Arc<dyn PosStore>) -> Self {
        Self {
            state: PluginState::new(
                NAME,
                "Tracks employee login/logout events and calculates time spent at terminals",
            ),
            store,
        }
    }

    async fn login(&self, event: &Event, cancel: &CancellationToken) -> Result<Vec<Event>, PluginError> {
        let login: Login = decode_payload(event)?;
        let at = event.timestamp();

        let current = guarded(cancel, self.store.current_terminal(&login.employee_id)).await?;

        let mut emitted = Vec::new();
        if let Some(previous) = current.filter(|t| *t != login.terminal_id) {
            if bool_or(&self.state.config(), AUTO_LOGOUT, true) {
                info!(
                    employee_id = login.employee_id.as_str(),
                    from = previous.as_str(),
                    to = login.terminal_id.as_str(),
                    "Auto-logout: employee logged in at another terminal"
                );
                emitted.push(Event::at(
                    EventKind::EmployeeLogout,
                    at,
                    json!({
                        "employee_id": login.employee_id,
                        "terminal_id": previous,
                        "store_id": login.store_id,
                        "auto_logout": true,
                        "reason": AUTO_LOGOUT_REASON,
                    }),
                ));
            }
        }

        let writes = vec![
            Write::EmployeeOnTerminal {
                employee_id: login.employee_id.clone(),
                terminal_id: login.terminal_id.clone(),
                at,
            },
            Write::OpenSession {
                employee_id: login.employee_id,
                terminal_id: login.terminal_id,
                at,
            },
        ];
        guarded(cancel, self.store.apply(writes)).await?;

        Ok(emitted)
    }

    async fn logout(&self, event: &Event, cancel: &CancellationToken) -> Result<Vec<Event>, PluginError> {
        let logout: Logout = decode_payload(event)?;
        let at = event.timestamp();

        let writes = vec![
            Write::EmployeeOffTerminal {
                employee_id: logout.employee_id.clone(),
                terminal_id: logout.terminal_id.clone(),
                at,
            },
            Write::CloseSession {
                employee_id: logout.employee_id,
                terminal_id: logout.terminal_id,
                at,
            },
        ];
        guarded(cancel, self.store.apply(writes)).await?;

        Ok(Vec::new())
    }
}

#[async_trait]
impl Plugin for EmployeeTracker {
    fn name(&self) -> &str {
        self.state.name()
    }

    fn description(&self) -> &str {
        self.state.description()
    }

    fn is_active(&self) -> bool {
        self.state.is_active()
    }

    fn set_active(&self, active: bool) {
        self.state.set_active(active)
    }

    fn config(&self) -> ConfigMap {
        self.state.config()
    }

    fn configure(&self, config: ConfigMap) -> Result<(), ConfigError> {
        validate(&config, &[(AUTO_LOGOUT, Accepts::Bool)])?;
        self.state.replace_config(config);
        Ok(())
    }

    fn reacts_to(&self, kind: &EventKind) -> bool {
        matches!(kind, EventKind::EmployeeLogin | EventKind::EmployeeLogout)
    }

    async fn process(&self, event: &Event, cancel: &CancellationToken) -> Outcome {
        if !self.is_active() {
            return Outcome::skip();
        }
        match event.kind() {
            EventKind::EmployeeLogin => self.login(event, cancel).await.into(),
            EventKind::EmployeeLogout => self.logout(event, cancel).await.into(),
            _ => Outcome::skip(),
        }
    }
}
