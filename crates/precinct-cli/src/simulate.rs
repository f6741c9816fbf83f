//! `simulate` subcommand: a scripted voter in front of the mock scanner.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use precinct_core::InterpretationMode;
use precinct_hardware::mock::{MockConnector, MockScannerHandle};
use precinct_scanner::mock::{MemorySheetStore, ScriptedInterpreter};
use precinct_scanner::{MachineSnapshot, PrecinctScanner, PublicState, PublicStatus, ScannerConfig, ScannerState};
use tracing::{info, warn};

use crate::cli::SimulateArgs;

/// Longest the voter waits for the scanner between two actions.
const STEP_TIMEOUT: Duration = Duration::from_secs(60);

/// Run a session and return the final public status.
pub async fn run(args: SimulateArgs) -> Result<PublicStatus> {
    let config = match &args.config {
        Some(path) => crate::check_config::load(path).await?,
        None => ScannerConfig::default(),
    };

    let (connector, voter) = MockConnector::new();
    let (scanner, controller) = PrecinctScanner::start(connector, config)?;

    let store = Arc::new(MemorySheetStore::new());
    let interpreter = Arc::new(ScriptedInterpreter::always(args.classification.classification()));
    scanner.configure(store, interpreter).await?;
    if args.skip_interpretation {
        scanner.set_interpretation_mode(InterpretationMode::Skip).await?;
    }

    let session = Session {
        scanner: &scanner,
        voter: &voter,
    };
    for n in 1..=args.sheets {
        info!("Sheet {} of {}", n, args.sheets);
        session.feed_sheet().await.with_context(|| format!("sheet {n}"))?;
    }

    let status = scanner.status();
    drop(scanner);
    controller.await?;
    Ok(status)
}

struct Session<'a> {
    scanner: &'a PrecinctScanner,
    voter: &'a MockScannerHandle,
}

impl Session<'_> {
    async fn wait_until(&self, what: &str, predicate: impl FnMut(&MachineSnapshot) -> bool) -> Result<MachineSnapshot> {
        match tokio::time::timeout(STEP_TIMEOUT, self.scanner.wait_until(predicate)).await {
            Ok(snapshot) => Ok(snapshot?),
            Err(_) => bail!("timed out waiting for {what}, scanner is {}", self.scanner.snapshot().state),
        }
    }

    /// Insert one sheet and follow it until it is counted or back in the voter's hand.
    async fn feed_sheet(&self) -> Result<()> {
        self.wait_until("an empty scanner", |s| {
            matches!(
                s.state,
                ScannerState::NoPaper
                    | ScannerState::Accepted {
                        ready_for_next_ballot: true
                    }
            )
        })
        .await?;

        self.voter.load_sheet();
        self.wait_until("the sheet", |s| s.state == ScannerState::ReadyToScan)
            .await?;
        self.scanner.scan().await?;

        let scanned = self
            .wait_until("a verdict", |s| {
                matches!(
                    s.public_status().state,
                    PublicState::ReadyToAccept
                        | PublicState::NeedsReview
                        | PublicState::Rejected
                        | PublicState::Jammed
                        | PublicState::BothSidesHavePaper
                        | PublicState::UnrecoverableError
                )
            })
            .await?;

        let status = scanned.public_status();
        match status.state {
            PublicState::ReadyToAccept => {
                self.scanner.accept().await?;
                self.wait_until("the drop", |s| matches!(s.state, ScannerState::Accepted { .. }))
                    .await?;
                info!("Sheet accepted, {} counted", self.scanner.status().ballots_counted);
            }
            PublicState::NeedsReview => {
                self.scanner.return_sheet().await?;
                self.wait_until("the return", |s| s.state == ScannerState::Returned)
                    .await?;
                info!("Sheet returned for review");
                self.voter.remove_sheet();
            }
            PublicState::Rejected => {
                warn!("Sheet rejected: {}", status.error.as_deref().unwrap_or("invalid sheet"));
                self.voter.remove_sheet();
            }
            state => bail!("scanner stopped in {state}"),
        }
        Ok(())
    }
}
