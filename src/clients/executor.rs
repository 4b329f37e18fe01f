// Trade placement collaborators

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{ExecutorConfig, ExecutorMode};
use crate::core::cascade::TradeOrder;
use crate::core::types::Direction;
use crate::error::{BotError, BotResult};

/// Issues the physical trade action.
///
/// `Ok` means the action was issued without a local error; it says nothing
/// about whether the trade won.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn place_trade(&self, order: &TradeOrder) -> BotResult<()>;

    fn name(&self) -> &str;

    /// Whether the executor can run at all in this environment
    fn is_available(&self) -> bool {
        true
    }
}

/// Paper trading: logs the order and succeeds
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    placed: Mutex<Vec<TradeOrder>>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders seen so far
    pub fn placed(&self) -> Vec<TradeOrder> {
        self.placed.lock().clone()
    }
}

#[async_trait]
impl TradeExecutor for DryRunExecutor {
    async fn place_trade(&self, order: &TradeOrder) -> BotResult<()> {
        info!(
            "📝 [dry-run] {} {} stake {:.2} (level {})",
            order.direction, order.pair, order.stake_amount, order.level
        );
        self.placed.lock().push(order.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

/// Runs a configured command per direction, e.g. an `xdotool` hotkey that
/// clicks the broker's buy or sell button.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    buy_command: Vec<String>,
    sell_command: Vec<String>,
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(config: &ExecutorConfig) -> BotResult<Self> {
        if config.buy_command.is_empty() || config.sell_command.is_empty() {
            return Err(BotError::ExecutorUnavailable(
                "buy_command and sell_command must not be empty".to_string(),
            ));
        }
        Ok(Self {
            buy_command: config.buy_command.clone(),
            sell_command: config.sell_command.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        })
    }

    /// Command line for an order with `{amount}`, `{direction}`, `{pair}`
    /// and `{level}` substituted
    pub fn command_line(&self, order: &TradeOrder) -> Vec<String> {
        let template = match order.direction {
            Direction::Buy => &self.buy_command,
            Direction::Sell => &self.sell_command,
        };
        let amount = format!("{:.2}", order.stake_amount);
        let level = order.level.to_string();
        template
            .iter()
            .map(|arg| {
                arg.replace("{amount}", &amount)
                    .replace("{direction}", order.direction.as_str())
                    .replace("{pair}", &order.pair)
                    .replace("{level}", &level)
            })
            .collect()
    }

    fn programs(&self) -> impl Iterator<Item = &String> {
        self.buy_command.first().into_iter().chain(self.sell_command.first())
    }
}

#[async_trait]
impl TradeExecutor for CommandExecutor {
    async fn place_trade(&self, order: &TradeOrder) -> BotResult<()> {
        let argv = self.command_line(order);
        let Some((program, args)) = argv.split_first() else {
            return Err(BotError::ExecutionFailed("empty command".to_string()));
        };

        debug!("Running {} {:?}", program, args);
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                BotError::ExecutionFailed(format!(
                    "{} timed out after {}s",
                    program,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| BotError::ExecutionFailed(format!("{}: {}", program, e)))?;

        if output.status.success() {
            info!(
                "✅ Placed {} {} stake {:.2} (level {})",
                order.direction, order.pair, order.stake_amount, order.level
            );
            Ok(())
        } else {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("⚠️ {} exited with {}: {}", program, code, stderr.trim());
            Err(BotError::ExecutionFailed(format!(
                "{} exited with status {}",
                program, code
            )))
        }
    }

    fn name(&self) -> &str {
        "command"
    }

    fn is_available(&self) -> bool {
        self.programs().all(|program| program_on_path(program))
    }
}

/// Whether `program` resolves to a file, directly or through `PATH`
pub fn program_on_path(program: &str) -> bool {
    let direct = Path::new(program);
    if direct.components().count() > 1 {
        return direct.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

/// Build the executor selected by the config
pub fn build_executor(config: &ExecutorConfig, force_dry_run: bool) -> BotResult<Box<dyn TradeExecutor>> {
    if force_dry_run || config.mode == ExecutorMode::DryRun {
        return Ok(Box::new(DryRunExecutor::new()));
    }
    Ok(Box::new(CommandExecutor::new(config)?))
}
