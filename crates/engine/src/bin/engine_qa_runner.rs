use std::collections::VecDeque;
use std::env;
use std::sync::{Arc, Mutex};

use snafu::{OptionExt, Snafu};

use parla_engine::transport::NetworkSnafu;
use parla_engine::{
    BoxFuture, ChatEngine, ChatSettingsPatch, DialogId, EngineError, Model, ModelProvider,
    Transport, TransportResult,
};

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    SettingsFallback,
    TokenClamp,
    PromotionFlow,
    SecureRetrofit,
    RollbackRestore,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "settings_fallback" => Some(Self::SettingsFallback),
            "token_clamp" => Some(Self::TokenClamp),
            "promotion_flow" => Some(Self::PromotionFlow),
            "secure_retrofit" => Some(Self::SecureRetrofit),
            "rollback_restore" => Some(Self::RollbackRestore),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::SettingsFallback => "settings_fallback",
            Self::TokenClamp => "token_clamp",
            Self::PromotionFlow => "promotion_flow",
            Self::SecureRetrofit => "secure_retrofit",
            Self::RollbackRestore => "rollback_restore",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("missing required --scenario argument"))]
    MissingScenario { stage: &'static str },
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(error) = run().await {
        println!("runner_ok=false");
        eprintln!("runner_error={error}");
        std::process::exit(1);
    }
}

async fn run() -> RunnerResult<()> {
    let args = parse_args(env::args().skip(1))?;
    println!("scenario={}", args.scenario.name());

    match args.scenario {
        Scenario::SettingsFallback => run_settings_fallback().await,
        Scenario::TokenClamp => run_token_clamp().await,
        Scenario::PromotionFlow => run_promotion_flow().await,
        Scenario::SecureRetrofit => run_secure_retrofit().await,
        Scenario::RollbackRestore => run_rollback_restore().await,
        Scenario::All => run_all().await,
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut scenario = None;
    let mut pending = args.into_iter();

    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-scenario-value",
                    arg: "--scenario",
                })?;

                let parsed = Scenario::parse(&value).context(UnknownScenarioSnafu {
                    stage: "parse-args-scenario",
                    raw: value,
                })?;
                scenario = Some(parsed);
            }
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(RunnerArgs {
        scenario: scenario.context(MissingScenarioSnafu {
            stage: "parse-args-scenario-required",
        })?,
    })
}

async fn run_all() -> RunnerResult<()> {
    run_settings_fallback().await?;
    run_token_clamp().await?;
    run_promotion_flow().await?;
    run_secure_retrofit().await?;
    run_rollback_restore().await?;
    println!("all_passed=true");
    Ok(())
}

async fn run_settings_fallback() -> RunnerResult<()> {
    let engine = ChatEngine::new(Arc::new(QueueTransport::new()));

    let defaults = engine.effective_settings().await;
    println!("default_model={}", defaults.model);
    println!("default_max_tokens={}", defaults.max_tokens);
    println!("default_temperature={}", defaults.temperature);

    engine
        .set_active_dialog(Some(DialogId::real("qa-dialog")))
        .await;
    engine
        .update_effective_settings(&ChatSettingsPatch {
            temperature: Some(0.1),
            ..ChatSettingsPatch::default()
        })
        .await;
    engine.set_active_dialog(None).await;

    let fallback_intact = engine.effective_settings().await == defaults;
    println!("fallback_intact={fallback_intact}");
    if !fallback_intact {
        return ScenarioFailedSnafu {
            stage: "scenario-settings-fallback-assert",
            scenario: "settings_fallback",
            reason: "an override for another conversation leaked into the defaults".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_token_clamp() -> RunnerResult<()> {
    let engine = ChatEngine::new(Arc::new(QueueTransport::new()));

    engine
        .update_effective_settings(&ChatSettingsPatch {
            max_tokens: Some(6_000),
            ..ChatSettingsPatch::default()
        })
        .await;

    engine
        .switch_model("qa/large-model", ModelProvider::Qwen)
        .await;
    let unclamped = engine.effective_settings().await.max_tokens;
    println!("unclamped_max_tokens={unclamped}");

    engine
        .switch_model("qa/small-model", ModelProvider::Qwen)
        .await;
    let clamped = engine.effective_settings().await.max_tokens;
    println!("clamped_max_tokens={clamped}");

    if unclamped != 6_000 || clamped != 4_000 {
        return ScenarioFailedSnafu {
            stage: "scenario-token-clamp-assert",
            scenario: "token_clamp",
            reason: format!("expected 6000/4000 but saw {unclamped}/{clamped}"),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_promotion_flow() -> RunnerResult<()> {
    let transport = QueueTransport::new();
    transport.push_plain(Ok(parla_engine::SendMessageResponse {
        response: "Hi!".to_string(),
        dialog_id: "qa-real".to_string(),
    }));
    let engine = ChatEngine::new(Arc::new(transport));

    let outcome = engine
        .send_message("Hello", Vec::new())
        .await
        .map_err(|error| scenario_failure("promotion_flow", &error))?;

    let real = DialogId::real("qa-real");
    let promoted = outcome.promoted_from.is_some();
    let old_key_gone = match &outcome.promoted_from {
        Some(provisional) => engine.cache().read(provisional).await.is_none(),
        None => false,
    };
    let message_count = engine
        .cache()
        .read(&real)
        .await
        .map_or(0, |entry| entry.messages.len());
    let active_is_real = engine.active_dialog().await == Some(real);

    println!("promoted={promoted}");
    println!("old_key_gone={old_key_gone}");
    println!("message_count={message_count}");
    println!("active_is_real={active_is_real}");

    if !promoted || !old_key_gone || message_count != 2 || !active_is_real {
        return ScenarioFailedSnafu {
            stage: "scenario-promotion-flow-assert",
            scenario: "promotion_flow",
            reason: "promotion left the cache or the active pointer inconsistent".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_secure_retrofit() -> RunnerResult<()> {
    let transport = QueueTransport::new();
    transport.push_secure(Ok(parla_engine::SendSecureMessageResponse {
        encrypted_response: "cipher".to_string(),
        decrypted_response: "Understood.".to_string(),
        secrets: Vec::new(),
        content_type: "text/plain".to_string(),
        dialog_id: "qa-secure".to_string(),
    }));
    let engine = ChatEngine::new(Arc::new(transport));

    let dialog = DialogId::real("qa-secure");
    engine.set_active_dialog(Some(dialog.clone())).await;
    engine
        .update_effective_settings(&ChatSettingsPatch {
            has_encrypted_messages: Some(true),
            ..ChatSettingsPatch::default()
        })
        .await;

    engine
        .send_message("secret text", Vec::new())
        .await
        .map_err(|error| scenario_failure("secure_retrofit", &error))?;

    let entry = engine.cache().read(&dialog).await;
    let encrypted_count = entry.as_ref().map_or(0, |entry| {
        entry
            .messages
            .iter()
            .filter(|message| message.encrypted_content.is_some())
            .count()
    });
    let user_count = entry.as_ref().map_or(0, |entry| entry.user_message_count());

    println!("user_count={user_count}");
    println!("encrypted_count={encrypted_count}");

    if user_count != 1 || encrypted_count != 1 {
        return ScenarioFailedSnafu {
            stage: "scenario-secure-retrofit-assert",
            scenario: "secure_retrofit",
            reason: format!("expected 1/1 but saw {user_count}/{encrypted_count}"),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_rollback_restore() -> RunnerResult<()> {
    let transport = QueueTransport::new();
    transport.push_plain(Err(NetworkSnafu {
        stage: "qa-scripted-failure",
        message: "connection reset".to_string(),
    }
    .build()));
    let engine = ChatEngine::new(Arc::new(transport));

    let send_rejected = engine.send_message("Hello", Vec::new()).await.is_err();
    let active_cleared = engine.active_dialog().await.is_none();

    println!("send_rejected={send_rejected}");
    println!("active_cleared={active_cleared}");

    if !send_rejected || !active_cleared {
        return ScenarioFailedSnafu {
            stage: "scenario-rollback-restore-assert",
            scenario: "rollback_restore",
            reason: "a failed first send left optimistic state behind".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

fn scenario_failure(scenario: &'static str, error: &EngineError) -> RunnerError {
    ScenarioFailedSnafu {
        stage: "scenario-send",
        scenario,
        reason: error.to_string(),
    }
    .build()
}

/// Minimal scripted transport for deterministic scenario runs.
struct QueueTransport {
    plain: Mutex<VecDeque<TransportResult<parla_engine::SendMessageResponse>>>,
    secure: Mutex<VecDeque<TransportResult<parla_engine::SendSecureMessageResponse>>>,
    models: Vec<Model>,
}

impl QueueTransport {
    fn new() -> Self {
        Self {
            plain: Mutex::new(VecDeque::new()),
            secure: Mutex::new(VecDeque::new()),
            models: vec![
                Model {
                    id: "qa/small-model".to_string(),
                    name: "QA Small".to_string(),
                    provider: ModelProvider::Qwen,
                    context_window: 32_000,
                    max_output: 4_000,
                },
                Model {
                    id: "qa/large-model".to_string(),
                    name: "QA Large".to_string(),
                    provider: ModelProvider::Qwen,
                    context_window: 128_000,
                    max_output: 16_000,
                },
            ],
        }
    }

    fn push_plain(&self, response: TransportResult<parla_engine::SendMessageResponse>) {
        self.plain.lock().unwrap().push_back(response);
    }

    fn push_secure(&self, response: TransportResult<parla_engine::SendSecureMessageResponse>) {
        self.secure.lock().unwrap().push_back(response);
    }
}

impl Transport for QueueTransport {
    fn send_plain<'a>(
        &'a self,
        _request: &'a parla_engine::SendMessageRequest,
    ) -> BoxFuture<'a, TransportResult<parla_engine::SendMessageResponse>> {
        Box::pin(async move {
            self.plain.lock().unwrap().pop_front().unwrap_or_else(|| {
                Err(NetworkSnafu {
                    stage: "qa-transport",
                    message: "no scripted plain response left".to_string(),
                }
                .build())
            })
        })
    }

    fn send_secure<'a>(
        &'a self,
        _request: &'a parla_engine::SendMessageRequest,
    ) -> BoxFuture<'a, TransportResult<parla_engine::SendSecureMessageResponse>> {
        Box::pin(async move {
            self.secure.lock().unwrap().pop_front().unwrap_or_else(|| {
                Err(NetworkSnafu {
                    stage: "qa-transport",
                    message: "no scripted secure response left".to_string(),
                }
                .build())
            })
        })
    }

    fn fetch_models<'a>(&'a self) -> BoxFuture<'a, TransportResult<Vec<Model>>> {
        Box::pin(async move { Ok(self.models.clone()) })
    }
}
