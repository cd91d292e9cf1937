//! Gerenciador de privilégios de console.
//!
//! Faz o papel do gerenciador da plataforma: `allow`/`deny` respondem na
//! hora; `ask` pergunta uma vez no terminal e entrega a resposta pelo
//! callback registrado, numa thread própria.

use heartwatch_core::permission::{
    CallCause, CheckResult, PermissionResponse, PlatformError, PrivilegeManager, RequestResult,
    ResponseHandler, SubscriptionId,
};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Política configurada em `sender.permission`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Allow,
    Deny,
    Ask,
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Policy::Allow),
            "deny" => Ok(Policy::Deny),
            "ask" => Ok(Policy::Ask),
            other => Err(format!("Permissão inválida: {other:?} (allow, deny, ask)")),
        }
    }
}

/// Pergunta feita ao usuário; retorna a linha digitada.
pub type Prompt = Arc<dyn Fn(&str) -> io::Result<String> + Send + Sync>;

type SharedHandler = Arc<dyn Fn(PermissionResponse) + Send + Sync>;
type Handlers = Arc<Mutex<HashMap<SubscriptionId, (String, SharedHandler)>>>;

pub struct ConsolePrivilegeManager {
    policy: Policy,
    prompt: Prompt,
    handlers: Handlers,
    next_id: AtomicU64,
    /// Lembra um `AllowForever` já concedido
    granted: Arc<AtomicBool>,
}

impl ConsolePrivilegeManager {
    pub fn new(policy: Policy) -> Self {
        Self::with_prompt(policy, Arc::new(stdin_prompt))
    }

    pub fn with_prompt(policy: Policy, prompt: Prompt) -> Self {
        Self {
            policy,
            prompt,
            handlers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            granted: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl PrivilegeManager for ConsolePrivilegeManager {
    fn check(&self, _privilege: &str) -> Result<CheckResult, PlatformError> {
        Ok(match self.policy {
            Policy::Allow => CheckResult::Allow,
            Policy::Deny => CheckResult::Deny,
            Policy::Ask if self.granted.load(Ordering::Acquire) => CheckResult::Allow,
            Policy::Ask => CheckResult::Ask,
        })
    }

    fn subscribe(&self, privilege: &str, handler: ResponseHandler) -> Option<SubscriptionId> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, (privilege.to_string(), Arc::from(handler)));
        Some(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn request(&self, privilege: &str) -> Result<(), PlatformError> {
        let prompt = Arc::clone(&self.prompt);
        let handlers = Arc::clone(&self.handlers);
        let granted = Arc::clone(&self.granted);
        let privilege = privilege.to_string();

        std::thread::Builder::new()
            .name("privilege-prompt".into())
            .spawn(move || {
                let question = format!("Permitir acesso a {privilege}? [s]empre / [u]ma vez / [n]ão: ");
                let response = match prompt(&question) {
                    Ok(answer) => PermissionResponse::answer(parse_answer(&answer)),
                    Err(e) => {
                        debug!("Falha ao ler resposta: {e}");
                        PermissionResponse {
                            cause: CallCause::Error,
                            result: RequestResult::DenyOnce,
                        }
                    }
                };
                if response.cause == CallCause::Answer
                    && response.result == RequestResult::AllowForever
                {
                    granted.store(true, Ordering::Release);
                }
                info!(?response, "Resposta de privilégio recebida");

                let targets: Vec<SharedHandler> = handlers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .filter(|(p, _)| *p == privilege)
                    .map(|(_, h)| Arc::clone(h))
                    .collect();
                for handler in targets {
                    handler(response);
                }
            })
            .map(|_| ())
            .map_err(|e| PlatformError(format!("Falha ao criar thread de prompt: {e}")))
    }
}

fn parse_answer(answer: &str) -> RequestResult {
    match answer.trim().to_ascii_lowercase().as_str() {
        "s" | "sim" | "y" | "yes" | "sempre" => RequestResult::AllowForever,
        "u" | "uma" | "once" => RequestResult::AllowOnce,
        "n" | "não" | "nao" | "no" => RequestResult::DenyForever,
        _ => RequestResult::DenyOnce,
    }
}

fn stdin_prompt(question: &str) -> io::Result<String> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(question.as_bytes())?;
    stdout.flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin fechado"));
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use heartwatch_core::permission::PermissionGate;

    const PRIVILEGE: &str = "http://tizen.org/privilege/healthinfo";

    fn answering(answer: &'static str) -> Prompt {
        Arc::new(move |_: &str| -> io::Result<String> { Ok(answer.to_string()) })
    }

    #[test]
    fn parses_policy() {
        assert_eq!("ALLOW".parse::<Policy>(), Ok(Policy::Allow));
        assert_eq!(" ask ".parse::<Policy>(), Ok(Policy::Ask));
        assert!("maybe".parse::<Policy>().is_err());
    }

    #[test]
    fn parses_answers() {
        assert_eq!(parse_answer("s\n"), RequestResult::AllowForever);
        assert_eq!(parse_answer("u"), RequestResult::AllowOnce);
        assert_eq!(parse_answer("n"), RequestResult::DenyForever);
        assert_eq!(parse_answer(""), RequestResult::DenyOnce);
    }

    #[tokio::test]
    async fn allow_policy_grants_without_prompt() {
        let manager = ConsolePrivilegeManager::with_prompt(
            Policy::Allow,
            Arc::new(|_: &str| -> io::Result<String> { panic!("não deveria perguntar") }),
        );
        let gate = PermissionGate::new(Arc::new(manager), PRIVILEGE);
        assert_eq!(gate.check().await, Ok(true));
    }

    #[tokio::test]
    async fn deny_policy_refuses() {
        let manager = ConsolePrivilegeManager::with_prompt(Policy::Deny, answering("s"));
        let gate = PermissionGate::new(Arc::new(manager), PRIVILEGE);
        assert_eq!(gate.check().await, Ok(false));
    }

    #[tokio::test]
    async fn ask_policy_prompts_and_remembers_forever() {
        let manager = Arc::new(ConsolePrivilegeManager::with_prompt(
            Policy::Ask,
            answering("sim"),
        ));
        let gate = PermissionGate::new(Arc::clone(&manager), PRIVILEGE);
        assert_eq!(gate.check().await, Ok(true));
        assert_eq!(manager.check(PRIVILEGE).unwrap(), CheckResult::Allow);
        assert!(manager.handlers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ask_policy_once_is_not_enough() {
        let manager = ConsolePrivilegeManager::with_prompt(Policy::Ask, answering("u"));
        let gate = PermissionGate::new(Arc::new(manager), PRIVILEGE);
        assert_eq!(gate.check().await, Ok(false));
    }

    #[tokio::test]
    async fn prompt_failure_resolves_false() {
        let manager = ConsolePrivilegeManager::with_prompt(
            Policy::Ask,
            Arc::new(|_: &str| -> io::Result<String> {
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"))
            }),
        );
        let gate = PermissionGate::new(Arc::new(manager), PRIVILEGE);
        assert_eq!(gate.check().await, Ok(false));
    }
}
