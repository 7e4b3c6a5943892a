//! Line-oriented front end over [`ChatApp`] and the local backend.

use std::sync::Arc;

use anyhow::{Context, Result};
use chat_client::config::Config;
use chat_client::model::{Friendship, Message, User};
use chat_client::projector::{FriendsView, Projector};
use chat_client::recent::Conversation;
use chat_client::{account::Registration, AppEvent, ChatApp};
use memstore::{MemoryAuth, MemoryStore};
use store_api::{AuthUser, FederatedProvider};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const HELP: &str = "\
commands:
  register <name> <email> <password> <confirm>
  login <email> <password>
  provider google|github
  logout
  friends | requests | recent
  add <email>          send a friend request
  accept <request-id>  accept an incoming request
  open <friend-id>     open a chat
  send <text>          send to the open chat
  close                close the open chat
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register(Registration),
    Login { email: String, password: String },
    Provider(FederatedProvider),
    Logout,
    Friends,
    Requests,
    Recent,
    Add(String),
    Accept(String),
    Open(String),
    Send(String),
    Close,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();
        let one = |what: &str| match args.as_slice() {
            [arg] => Ok(arg.to_string()),
            _ => Err(format!("usage: {word} <{what}>")),
        };
        let cmd = match word {
            "" => return Ok(None),
            "register" => match args.as_slice() {
                [name, email, password, confirm] => Self::Register(Registration {
                    display_name: name.to_string(),
                    email: email.to_string(),
                    password: password.to_string(),
                    confirm_password: confirm.to_string(),
                }),
                _ => return Err("usage: register <name> <email> <password> <confirm>".into()),
            },
            "login" => match args.as_slice() {
                [email, password] => Self::Login {
                    email: email.to_string(),
                    password: password.to_string(),
                },
                _ => return Err("usage: login <email> <password>".into()),
            },
            "provider" => match args.as_slice() {
                ["google"] => Self::Provider(FederatedProvider::Google),
                ["github"] => Self::Provider(FederatedProvider::GitHub),
                _ => return Err("usage: provider google|github".into()),
            },
            "logout" => Self::Logout,
            "friends" => Self::Friends,
            "requests" => Self::Requests,
            "recent" => Self::Recent,
            "add" => Self::Add(one("email")?),
            "accept" => Self::Accept(one("request-id")?),
            "open" => Self::Open(one("friend-id")?),
            // keep the text as typed; blank text is rejected by the chat
            "send" => Self::Send(rest.to_string()),
            "close" => Self::Close,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}', try help")),
        };
        Ok(Some(cmd))
    }
}

/// Prints state changes for a terminal user.
#[derive(Debug, Default)]
pub struct ConsoleProjector {
    me: Option<String>,
}

impl Projector for ConsoleProjector {
    fn signed_in(&mut self, user: &AuthUser) {
        self.me = Some(user.uid.clone());
        println!("signed in as {} ({})", user.uid, user.email.as_deref().unwrap_or("-"));
    }

    fn signed_out(&mut self) {
        self.me = None;
        println!("signed out");
    }

    fn profile_loaded(&mut self, user: &User) {
        println!("welcome, {} [{:?}]", user.display_name, user.status);
    }

    fn friends_replaced(&mut self, view: FriendsView<'_>) {
        match view {
            FriendsView::NoFriends => println!("no friends yet, add some with `add <email>`"),
            FriendsView::Friends(friends) => {
                println!("friends ({}):", friends.len());
                for id in friends.keys() {
                    println!("  {id}");
                }
            }
        }
    }

    fn requests_replaced(&mut self, incoming: &[Friendship]) {
        if !incoming.is_empty() {
            println!("{} pending friend request(s)", incoming.len());
        }
    }

    fn conversations_replaced(&mut self, conversations: &[Conversation]) {
        for c in conversations.iter().take(5) {
            println!("  {:<20} {}", c.partner_id, c.last_message.text);
        }
    }

    fn chat_opened(&mut self, friend_id: &str, chat_id: &str, history: &[Message]) {
        println!("-- chat with {friend_id} --");
        for message in history {
            self.message_appended(chat_id, message);
        }
    }

    fn message_appended(&mut self, _chat_id: &str, message: &Message) {
        let marker = if self.me.as_deref() == Some(message.sender_id.as_str()) {
            ">"
        } else {
            "<"
        };
        println!("{marker} {}: {}", message.sender_id, message.text);
    }

    fn chat_closed(&mut self, chat_id: &str) {
        println!("-- closed {chat_id} --");
    }

    fn notify(&mut self, title: &str, message: &str) {
        println!("! {title}: {message}");
    }
}

enum Input {
    Line(std::io::Result<Option<String>>),
    App(Option<AppEvent>),
}

/// Returns `false` when the user asked to quit.
async fn execute(app: &mut ChatApp<ConsoleProjector>, cmd: Command) -> bool {
    match cmd {
        Command::Register(form) => {
            let _ = app.register(&form).await;
        }
        Command::Login { email, password } => {
            let _ = app.login(&email, &password).await;
        }
        Command::Provider(provider) => {
            let _ = app.login_with_provider(provider).await;
        }
        Command::Logout => app.logout().await,
        Command::Friends => {
            let friends: Vec<&str> = app.session().friends().friend_ids().collect();
            if friends.is_empty() {
                println!("no friends yet");
            }
            for id in friends {
                println!("  {id}");
            }
        }
        Command::Requests => {
            for r in app.session().incoming_requests() {
                println!("  {}  from {}", r.id, r.sender_id);
            }
        }
        Command::Recent => {
            for c in app.session().recent().conversations() {
                println!("  {:<20} {}", c.partner_id, c.last_message.text);
            }
        }
        Command::Add(email) => {
            if let Ok(id) = app.request_friend(&email).await {
                println!("request {id} sent");
            }
        }
        Command::Accept(id) => {
            let _ = app.accept_request(&id).await;
        }
        Command::Open(friend) => {
            let _ = app.open_chat(&friend).await;
        }
        Command::Send(text) => {
            let _ = app.send_message(&text).await;
        }
        Command::Close => app.close_chat(),
        Command::Help => println!("{HELP}"),
        Command::Quit => return false,
    }
    true
}

/// Local auth backend with one federated identity per provider, so the
/// `provider` command has someone to sign in as.
fn local_auth() -> MemoryAuth {
    let auth = MemoryAuth::new();
    for (provider, name) in [
        (FederatedProvider::Google, "google"),
        (FederatedProvider::GitHub, "github"),
    ] {
        auth.register_federated_identity(
            provider,
            AuthUser {
                uid: format!("{name}-demo"),
                email: Some(format!("demo@{name}.example")),
                display_name: Some(format!("Demo ({name})")),
            },
        );
    }
    auth
}

pub async fn run(cfg: Config) -> Result<()> {
    let store = match &cfg.data_file {
        Some(path) => MemoryStore::open(path)
            .await
            .with_context(|| format!("opening {}", path.display()))?,
        None => MemoryStore::new(),
    };
    info!(file = ?store.path(), "local backend ready");
    let mut app = ChatApp::new(
        Arc::new(local_auth()),
        Arc::new(store),
        cfg.session_settings(),
        cfg.min_password_len,
        ConsoleProjector::default(),
    );

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line),
            event = app.next_event() => Input::App(event),
        };
        match input {
            Input::App(Some(event)) => app.dispatch(event).await,
            Input::App(None) => break,
            Input::Line(line) => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(Some(cmd)) => {
                        if !execute(&mut app, cmd).await {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(usage) => println!("{usage}"),
                }
            }
        }
    }
    app.session_mut().end();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_api::AuthProvider;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("   "), Ok(None));
        assert_eq!(
            Command::parse("login ann@example.org secret1"),
            Ok(Some(Command::Login {
                email: "ann@example.org".into(),
                password: "secret1".into()
            }))
        );
        assert_eq!(
            Command::parse("provider github"),
            Ok(Some(Command::Provider(FederatedProvider::GitHub)))
        );
        assert_eq!(
            Command::parse("send  hello there "),
            Ok(Some(Command::Send("hello there".into())))
        );
        assert_eq!(Command::parse("send"), Ok(Some(Command::Send(String::new()))));
        assert_eq!(Command::parse("open u2"), Ok(Some(Command::Open("u2".into()))));
    }

    #[test]
    fn rejects_bad_arity_and_unknown_words() {
        assert!(Command::parse("open").is_err());
        assert!(Command::parse("open a b").is_err());
        assert!(Command::parse("login only-email").is_err());
        assert!(Command::parse("dance").is_err());
    }

    #[tokio::test]
    async fn provider_identities_are_registered() {
        let auth = local_auth();
        for provider in [FederatedProvider::Google, FederatedProvider::GitHub] {
            let user = auth.sign_in_with_provider(provider).await.unwrap();
            assert!(user.uid.ends_with("-demo"));
        }
    }

    #[test]
    fn register_keeps_all_fields() {
        match Command::parse("register Ann ann@example.org secret1 secret1") {
            Ok(Some(Command::Register(form))) => {
                assert_eq!(form.display_name, "Ann");
                assert_eq!(form.confirm_password, "secret1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
