//! Lingxi command-line entry point.

use lingxi_client::api_client::RestClient;
use lingxi_client::auth::SessionHandle;
use lingxi_client::config::ClientConfig;
use lingxi_client::error::ClientError;
use lingxi_client::stores::{NoteStore, PlanStore, QuestionStore, StoreContext, UserStore};
use lingxi_client::telemetry;
use lingxi_client::StudyBackend;
use lingxi_core::{ChapterId, QuestionId, QuestionListId};
use std::io::Write;
use std::sync::Arc;

const USAGE: &str = "lingxi [--config <path>] <login <user> <password> [--remember] | advice | plan-advice | summary <chapter_id> | graph <chapter_id> [--regenerate] | answer <list_id> <question_id> | plans>";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Login {
        username: String,
        password: String,
        remember: bool,
    },
    Advice,
    PlanAdvice,
    Summary(ChapterId),
    Graph {
        chapter_id: ChapterId,
        regenerate: bool,
    },
    Answer(QuestionListId, QuestionId),
    Plans,
}

impl Command {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, ClientError> {
        let mut positional = Vec::new();
        let mut remember = false;
        let mut regenerate = false;
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    args.next();
                }
                "--remember" => remember = true,
                "--regenerate" => regenerate = true,
                _ => positional.push(arg),
            }
        }

        let usage = || ClientError::Usage(USAGE.to_string());
        let id = |raw: Option<&String>| -> Result<i64, ClientError> {
            raw.and_then(|s| s.parse().ok()).ok_or_else(usage)
        };
        match positional.first().map(String::as_str) {
            Some("login") => match (positional.get(1), positional.get(2)) {
                (Some(username), Some(password)) => Ok(Self::Login {
                    username: username.clone(),
                    password: password.clone(),
                    remember,
                }),
                _ => Err(usage()),
            },
            Some("advice") => Ok(Self::Advice),
            Some("plan-advice") => Ok(Self::PlanAdvice),
            Some("summary") => Ok(Self::Summary(ChapterId::new(id(positional.get(1))?))),
            Some("graph") => Ok(Self::Graph {
                chapter_id: ChapterId::new(id(positional.get(1))?),
                regenerate,
            }),
            Some("answer") => Ok(Self::Answer(
                QuestionListId::new(id(positional.get(1))?),
                QuestionId::new(id(positional.get(2))?),
            )),
            Some("plans") => Ok(Self::Plans),
            _ => Err(usage()),
        }
    }
}

/// Prints only the part of a growing text not printed yet.
#[derive(Default)]
struct ProgressPrinter {
    printed: usize,
}

impl ProgressPrinter {
    fn show(&mut self, text: &str) {
        if let Some(fresh) = text.get(self.printed..) {
            print!("{fresh}");
            let _ = std::io::stdout().flush();
            self.printed = text.len();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let config = ClientConfig::load()?;
    telemetry::init_tracing(&config.logging)?;
    let command = Command::parse(std::env::args().skip(1))?;

    let session = SessionHandle::restore(config.session_path.clone())?;
    let client = RestClient::new(&config, session.clone())?;
    let backend: Arc<dyn StudyBackend> = Arc::new(client);
    let ctx = StoreContext::new(backend).with_config(&config);

    let result = run(command, &ctx, session).await;
    for notification in ctx.notifier.drain() {
        eprintln!("[{:?}] {}", notification.level, notification.message);
    }
    result
}

async fn run(command: Command, ctx: &StoreContext, session: SessionHandle) -> Result<(), ClientError> {
    match command {
        Command::Login {
            username,
            password,
            remember,
        } => {
            let user = UserStore::new(ctx.clone(), session)
                .login(&username, &password, remember)
                .await?;
            println!("Signed in as {} (balance {})", user.username, user.token_balance);
        }
        Command::Advice => {
            let advice = UserStore::new(ctx.clone(), session).user_advice().await?;
            println!("{advice}");
        }
        Command::PlanAdvice => {
            let mut printer = ProgressPrinter::default();
            let show: &mut dyn FnMut(&str) = &mut |text| printer.show(text);
            PlanStore::new(ctx.clone()).ai_advice(Some(show)).await?;
            println!();
        }
        Command::Summary(chapter_id) => {
            let summary = NoteStore::new(ctx.clone()).generate_summary(chapter_id).await?;
            println!("{summary}");
        }
        Command::Graph {
            chapter_id,
            regenerate,
        } => {
            let store = NoteStore::new(ctx.clone());
            let graph = if regenerate {
                Some(store.generate_knowledge_graph(chapter_id).await?)
            } else {
                store.fetch_knowledge_graph(chapter_id).await?
            };
            if let Some(graph) = graph {
                for item in &graph.items {
                    println!("{}: {}", item.name, item.description);
                }
                for (source, relation, target) in graph.named_relations() {
                    println!("{source} -[{relation}]-> {target}");
                }
            }
        }
        Command::Answer(list_id, question_id) => {
            let store = QuestionStore::new(ctx.clone());
            store.fetch_questions(list_id).await?;
            let answer = store.generate_answer(question_id).await?;
            println!("{answer}");
        }
        Command::Plans => {
            for plan in PlanStore::new(ctx.clone()).plans().await? {
                println!("[{:?}] {} (due {})", plan.level, plan.todo, plan.deadline);
            }
        }
    }
    Ok(())
}
