//! The paired client/server state machines.
//!
//! Each party moves through its own little automaton; on top of that sit
//! the linked rules (keep-alive, protocol switches, close propagation)
//! that re-derive both states after every individual transition. The
//! event-triggered table and the linked rules are both exhaustive matches,
//! so a new state or event variant fails to compile until every rule has
//! considered it.

use tracing::trace;

use crate::error::LocalProtocolError;
use crate::events::EventKind;

/// Which endpoint of the connection a party is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn peer(self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

/// The state of one party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Idle,
    /// Server only: the request head has arrived, the response has not
    /// been sent.
    SendResponse,
    SendBody,
    Done,
    MustClose,
    Closed,
    Error,
    /// Client only: a CONNECT or Upgrade request is fully sent and the
    /// server has not yet picked plain HTTP or a switch.
    MightSwitchProtocol,
    SwitchedProtocol,
}

/// A protocol switch the client has proposed and the server may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Switch {
    Upgrade,
    Connect,
}

/// Pending client switch proposals. CONNECT plus Upgrade in one request is
/// silly but legal, so both can be pending at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SwitchProposals {
    upgrade: bool,
    connect: bool,
}

impl SwitchProposals {
    pub fn propose(&mut self, switch: Switch) {
        match switch {
            Switch::Upgrade => self.upgrade = true,
            Switch::Connect => self.connect = true,
        }
    }

    pub fn contains(&self, switch: Switch) -> bool {
        match switch {
            Switch::Upgrade => self.upgrade,
            Switch::Connect => self.connect,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.upgrade && !self.connect
    }

    pub fn clear(&mut self) {
        *self = SwitchProposals::default();
    }
}

pub(crate) struct ConnectionState {
    pub keep_alive: bool,
    pub pending_switch_proposals: SwitchProposals,
    pub client: State,
    pub server: State,
}

impl ConnectionState {
    pub fn new() -> Self {
        ConnectionState {
            keep_alive: true,
            pending_switch_proposals: SwitchProposals::default(),
            client: State::Idle,
            server: State::Idle,
        }
    }

    pub fn state_of(&self, role: Role) -> State {
        match role {
            Role::Client => self.client,
            Role::Server => self.server,
        }
    }

    fn set_state(&mut self, role: Role, state: State) {
        match role {
            Role::Client => self.client = state,
            Role::Server => self.server = state,
        }
    }

    pub fn process_error(&mut self, role: Role) {
        self.set_state(role, State::Error);
        self.fire_state_triggered_transitions();
    }

    pub fn process_keep_alive_disabled(&mut self) {
        self.keep_alive = false;
        self.fire_state_triggered_transitions();
    }

    pub fn process_client_switch_proposal(&mut self, switch: Switch) {
        self.pending_switch_proposals.propose(switch);
        self.fire_state_triggered_transitions();
    }

    /// Run one event through the tables. `server_accepted_switch` is set
    /// when a server response accepts a pending proposal; it must match a
    /// proposal the client actually made.
    pub fn process_event(
        &mut self,
        role: Role,
        event: EventKind,
        server_accepted_switch: Option<Switch>,
    ) -> Result<(), LocalProtocolError> {
        if let Some(switch) = server_accepted_switch {
            debug_assert_eq!(role, Role::Server);
            if !self.pending_switch_proposals.contains(switch) {
                return Err(LocalProtocolError::new(format!(
                    "received server {:?} event without a pending proposal",
                    switch
                )));
            }
        }
        if server_accepted_switch.is_none() && event == EventKind::Response {
            // A final response that doesn't accept any switch denies them
            // all.
            self.pending_switch_proposals.clear();
        }
        self.fire_event_triggered_transition(role, event, server_accepted_switch)?;
        if event == EventKind::Request {
            // Seeing the request line is what moves the server out of Idle.
            debug_assert_eq!(role, Role::Client);
            self.fire_request_received()?;
        }
        self.fire_state_triggered_transitions();
        Ok(())
    }

    fn fire_event_triggered_transition(
        &mut self,
        role: Role,
        event: EventKind,
        switch: Option<Switch>,
    ) -> Result<(), LocalProtocolError> {
        use EventKind::*;
        use Role::*;
        use State::*;

        let state = self.state_of(role);
        let next = match (role, state, event, switch) {
            (Client, Idle, Request, None) => SendBody,
            (Client, Idle, ConnectionClosed, None) => Closed,
            (Client, SendBody, Data, None) => SendBody,
            (Client, SendBody, EndOfMessage, None) => Done,
            (Client, Done, ConnectionClosed, None) => Closed,
            (Client, MustClose, ConnectionClosed, None) => Closed,
            (Client, Closed, ConnectionClosed, None) => Closed,

            (Server, Idle, ConnectionClosed, None) => Closed,
            // An error response may go out before any request has been
            // read (bad request line, oversized headers).
            (Server, Idle, Response, None) => SendBody,
            (Server, SendResponse, InformationalResponse, None) => SendResponse,
            (Server, SendResponse, Response, None) => SendBody,
            (Server, SendResponse, InformationalResponse, Some(Switch::Upgrade)) => {
                SwitchedProtocol
            }
            (Server, SendResponse, Response, Some(Switch::Connect)) => SwitchedProtocol,
            (Server, SendBody, Data, None) => SendBody,
            (Server, SendBody, EndOfMessage, None) => Done,
            (Server, Done, ConnectionClosed, None) => Closed,
            (Server, MustClose, ConnectionClosed, None) => Closed,
            (Server, Closed, ConnectionClosed, None) => Closed,

            _ => {
                return Err(LocalProtocolError::new(format!(
                    "can't handle event type {:?} when role={:?} and state={:?}",
                    event, role, state
                )));
            }
        };
        trace!(?role, ?event, from = ?state, to = ?next, "event-triggered transition");
        self.set_state(role, next);
        Ok(())
    }

    fn fire_request_received(&mut self) -> Result<(), LocalProtocolError> {
        match self.server {
            State::Idle => {
                self.server = State::SendResponse;
                Ok(())
            }
            state => Err(LocalProtocolError::new(format!(
                "can't receive a request when server state is {:?}",
                state
            ))),
        }
    }

    /// Re-derive both states from the cross-party rules until nothing
    /// changes.
    fn fire_state_triggered_transitions(&mut self) {
        loop {
            let before = (self.client, self.server, self.keep_alive);

            // Client finished its request while a switch is pending: hold
            // in MightSwitchProtocol until the server commits either way.
            if !self.pending_switch_proposals.is_empty() && self.client == State::Done {
                self.client = State::MightSwitchProtocol;
            }
            if self.pending_switch_proposals.is_empty()
                && self.client == State::MightSwitchProtocol
            {
                self.client = State::Done;
            }

            if !self.keep_alive {
                if self.client == State::Done {
                    self.client = State::MustClose;
                }
                if self.server == State::Done {
                    self.server = State::MustClose;
                }
            }

            match (self.client, self.server) {
                (State::MightSwitchProtocol, State::SwitchedProtocol) => {
                    self.client = State::SwitchedProtocol;
                }
                (State::Closed, State::Done)
                | (State::Closed, State::Idle)
                | (State::Error, State::Done) => {
                    self.server = State::MustClose;
                }
                (State::Done, State::Closed)
                | (State::Idle, State::Closed)
                | (State::Done, State::Error) => {
                    self.client = State::MustClose;
                }
                _ => {}
            }

            if before == (self.client, self.server, self.keep_alive) {
                return;
            }
        }
    }

    pub fn start_next_cycle(&mut self) -> Result<(), LocalProtocolError> {
        if (self.client, self.server) != (State::Done, State::Done) {
            return Err(LocalProtocolError::new(format!(
                "not in a reusable state: client={:?} server={:?}",
                self.client, self.server
            )));
        }
        // Done/Done with keep-alive disabled or a switch pending would
        // already have been rewritten by the linked rules.
        debug_assert!(self.keep_alive);
        debug_assert!(self.pending_switch_proposals.is_empty());
        self.client = State::Idle;
        self.server = State::Idle;
        Ok(())
    }
}
