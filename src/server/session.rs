use anyhow::{Context, Result, anyhow};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::dom;
use crate::manager::{LinguisticsManager, ManagerOptions};
use crate::messages::{Request, Response};
use crate::services::Services;
use crate::storage::Stores;

const COMMAND_BUFFER: usize = 32;

enum Command {
    Load {
        html: String,
        reply: oneshot::Sender<Result<usize>>,
    },
    Message {
        request: Request,
        reply: oneshot::Sender<Response>,
    },
    Html {
        reply: oneshot::Sender<Option<String>>,
    },
}

// Handle to the thread that owns the loaded page. The tree is not `Send`, so
// every page operation runs there, one command at a time.
#[derive(Clone)]
pub(crate) struct PageSession {
    commands: mpsc::Sender<Command>,
}

impl PageSession {
    pub(crate) fn spawn(stores: Stores, services: Services, options: ManagerOptions) -> Result<Self> {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .with_context(|| "failed to build page runtime")?;
        thread::Builder::new()
            .name("page-session".to_string())
            .spawn(move || runtime.block_on(serve(receiver, stores, services, options)))
            .with_context(|| "failed to start page thread")?;
        Ok(Self { commands })
    }

    pub(crate) async fn load(&self, html: String) -> Result<usize> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Load { html, reply }).await?;
        response
            .await
            .with_context(|| "page thread dropped the request")?
    }

    pub(crate) async fn message(&self, request: Request) -> Result<Response> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Message { request, reply }).await?;
        response
            .await
            .with_context(|| "page thread dropped the request")
    }

    pub(crate) async fn html(&self) -> Result<Option<String>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Html { reply }).await?;
        response
            .await
            .with_context(|| "page thread dropped the request")
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("page thread has stopped"))
    }
}

async fn serve(
    mut receiver: mpsc::Receiver<Command>,
    stores: Stores,
    services: Services,
    options: ManagerOptions,
) {
    let mut page: Option<LinguisticsManager> = None;
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Load { html, reply } => {
                let document = dom::parse_document(&html);
                let loaded = LinguisticsManager::initialize(
                    document,
                    &stores,
                    services.clone(),
                    options.clone(),
                )
                .await;
                let result = match loaded {
                    Ok(manager) => {
                        let paragraphs = manager.paragraphs().len();
                        info!("loaded page with {} paragraphs", paragraphs);
                        page = Some(manager);
                        Ok(paragraphs)
                    }
                    Err(err) => Err(err),
                };
                let _ = reply.send(result);
            }
            Command::Message { request, reply } => {
                let response = match page.as_mut() {
                    Some(manager) => manager.handle(request).await,
                    None => Response::failure("No page loaded"),
                };
                let _ = reply.send(response);
            }
            Command::Html { reply } => {
                let _ = reply.send(page.as_ref().map(LinguisticsManager::html));
            }
        }
    }
    debug!("page session closed");
}
