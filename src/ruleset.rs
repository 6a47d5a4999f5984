use crate::protocol::Command;
use crate::request::Request;

/// RuleSet decides whether a parsed request may proceed. Consulted
/// after authentication and before any name resolution or dialing.
/// Custom implementations may inspect the request's destination or
/// auth payload for finer-grained policy.
pub trait RuleSet: Send + Sync {
    fn allow(&self, request: &Request) -> bool;
}

/// PermitCommand filters requests by command alone
#[derive(Debug, Clone, Copy)]
pub struct PermitCommand {
    pub connect: bool,
    pub bind: bool,
    pub associate: bool,
}

/// permit_all returns a RuleSet which allows all three commands
pub fn permit_all() -> PermitCommand {
    PermitCommand {
        connect: true,
        bind: true,
        associate: true,
    }
}

/// permit_none returns a RuleSet which disallows every command
pub fn permit_none() -> PermitCommand {
    PermitCommand {
        connect: false,
        bind: false,
        associate: false,
    }
}

impl RuleSet for PermitCommand {
    fn allow(&self, request: &Request) -> bool {
        match Command::from_byte(request.command) {
            Some(Command::Connect) => self.connect,
            Some(Command::Bind) => self.bind,
            Some(Command::UdpAssociate) => self.associate,
            None => false,
        }
    }
}
