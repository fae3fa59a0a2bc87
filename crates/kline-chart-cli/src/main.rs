use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kline_chart_core::controller::SelectionController;
use kline_chart_core::instrument::{Instrument, Interval, Selection};
use kline_chart_core::projection::ChartData;
use kline_chart_core::series::SeriesState;
use kline_chart_core::store::{FileStore, SeriesStore};
use kline_chart_core::tick::{Tick, candle_time};
use kline_chart_feed::binance::BinanceFeed;
use kline_chart_feed::config::{DEFAULT_ENDPOINT, FeedConfig};
use kline_chart_feed::driver::{Driver, UserEvent};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "kline-chart",
    about = "Stream Binance candles into a persisted line chart"
)]
struct Cli {
    /// Root directory for saved series (default: current directory)
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream candles and print the chart as it updates.
    /// Type `coin <id>`, `tf <interval>` or `quit` on stdin to change selection.
    Watch {
        /// Instrument to start with: ethusdt, bnbusdt, dotusdt
        #[arg(short, long, default_value = "ethusdt")]
        instrument: Instrument,

        /// Candle interval to start with: 1m, 3m, 5m
        #[arg(short = 't', long, default_value = "1m")]
        interval: Interval,

        /// WebSocket base URL
        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,
    },

    /// Show which instruments have saved series
    Status,

    /// Print the saved chart for an instrument
    Show {
        #[arg(short, long)]
        instrument: Instrument,

        /// Only print the most recent N points
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Remove saved series (all instruments if omitted)
    Clear {
        #[arg(short, long)]
        instrument: Option<Instrument>,
    },
}

fn format_time(millis: i64) -> String {
    candle_time(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn format_tick_time(tick: &Tick) -> String {
    tick.open_time()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| tick.time.to_string())
}

/// One status line for a chart update.
fn render_line(chart: &ChartData) -> String {
    match chart.last() {
        Some((time, close)) => format!(
            "{}: {} point(s), last {} close {close}",
            chart.title,
            chart.len(),
            format_time(time)
        ),
        None => format!("{}: waiting for data", chart.title),
    }
}

/// Parse a stdin command: `coin <id>`, `tf <interval>`, or `quit`.
fn parse_user_event(line: &str) -> Result<Option<UserEvent>> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let argument = words.next();

    let event = match (command, argument) {
        ("quit" | "q" | "exit", None) => UserEvent::Quit,
        ("coin" | "instrument", Some(id)) => UserEvent::SelectInstrument(id.parse()?),
        ("tf" | "interval", Some(tf)) => UserEvent::SelectInterval(tf.parse()?),
        _ => anyhow::bail!("unknown command '{line}'. Expected: coin <id>, tf <interval>, quit"),
    };
    Ok(Some(event))
}

/// Forward selection commands from `input` until `quit`, end of input, or the
/// event loop goes away. Blocking: run it on its own thread.
///
/// stdin is not read through tokio, whose blocking read would keep the runtime
/// alive after Ctrl-C until another line arrives. A plain thread blocked on
/// stdin does not hold up process exit.
fn forward_lines(input: impl BufRead, user_tx: mpsc::Sender<UserEvent>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to read stdin: {e}");
                return;
            }
        };
        match parse_user_event(&line) {
            Ok(Some(event)) => {
                let quit = event == UserEvent::Quit;
                if user_tx.blocking_send(event).is_err() || quit {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => eprintln!("{e}"),
        }
    }
}

async fn cmd_watch(
    data_dir: &Path,
    instrument: Instrument,
    interval: Interval,
    endpoint: String,
) -> Result<()> {
    let config = FeedConfig::with_endpoint(endpoint);
    let store = SeriesStore::new(FileStore::new(data_dir));
    let controller =
        SelectionController::with_selection(store, Selection::new(instrument, interval));
    let driver = Driver::new(Arc::new(BinanceFeed::new(&config)), controller, &config);

    let (user_tx, user_rx) = mpsc::channel(16);
    // The Ctrl-C task keeps a sender, so closing stdin does not stop streaming.
    let ctrl_c_tx = user_tx.clone();
    std::thread::spawn(move || forward_lines(std::io::stdin().lock(), user_tx));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_tx.send(UserEvent::Quit).await;
        }
    });

    let controller = driver
        .run(user_rx, |chart| println!("{}", render_line(chart)))
        .await;
    let selection = controller.selection();
    info!(
        "{}: {} tick(s) in memory at exit",
        selection.instrument,
        controller.series().len(selection.instrument)
    );
    Ok(())
}

fn cmd_status(store: &SeriesStore<FileStore>) -> Result<()> {
    let instruments = store
        .stored_instruments()
        .context("failed to list saved series")?;

    if instruments.is_empty() {
        println!("No saved series.");
        return Ok(());
    }

    for instrument in instruments {
        let series = store
            .load(instrument)
            .with_context(|| format!("failed to load {instrument}"))?;
        match (series.first(), series.last()) {
            (Some(first), Some(last)) => println!(
                "{} ({}): {} tick(s), {} to {}",
                instrument,
                instrument.label(),
                series.len(),
                format_tick_time(first),
                format_tick_time(last)
            ),
            _ => println!("{instrument} ({}): empty", instrument.label()),
        }
    }
    Ok(())
}

fn cmd_show(
    store: &SeriesStore<FileStore>,
    instrument: Instrument,
    limit: Option<usize>,
) -> Result<()> {
    let series = store
        .load(instrument)
        .with_context(|| format!("failed to load {instrument}"))?;
    let mut state = SeriesState::new();
    state.replace(instrument, series);
    // Saved series carry no interval, so the title uses the default.
    let chart = ChartData::project(&state, Selection::new(instrument, Interval::default()));

    println!("{}", render_line(&chart));
    let skip = limit.map_or(0, |n| chart.len().saturating_sub(n));
    for (time, close) in chart.labels.iter().zip(&chart.values).skip(skip) {
        println!("{}  {close}", format_time(*time));
    }
    Ok(())
}

fn cmd_clear(store: &mut SeriesStore<FileStore>, instrument: Option<Instrument>) -> Result<()> {
    let targets = match instrument {
        Some(i) => vec![i],
        None => store
            .stored_instruments()
            .context("failed to list saved series")?,
    };
    for instrument in targets {
        store
            .clear(instrument)
            .with_context(|| format!("failed to clear {instrument}"))?;
        println!("{instrument}: cleared");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut store = SeriesStore::new(FileStore::new(&cli.data_dir));

    match &cli.command {
        Commands::Watch {
            instrument,
            interval,
            endpoint,
        } => {
            cmd_watch(&cli.data_dir, *instrument, *interval, endpoint.clone()).await?;
        }
        Commands::Status => {
            cmd_status(&store)?;
        }
        Commands::Show { instrument, limit } => {
            cmd_show(&store, *instrument, *limit)?;
        }
        Commands::Clear { instrument } => {
            cmd_clear(&mut store, *instrument)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_watch_defaults() {
        let cli = Cli::try_parse_from(["kline-chart", "watch"]).unwrap();
        match cli.command {
            Commands::Watch {
                instrument,
                interval,
                endpoint,
            } => {
                assert_eq!(instrument, Instrument::EthUsdt);
                assert_eq!(interval, Interval::OneMinute);
                assert_eq!(endpoint, DEFAULT_ENDPOINT);
            }
            _ => panic!("expected Watch command"),
        }
    }

    #[test]
    fn parse_watch_args() {
        let cli = Cli::try_parse_from([
            "kline-chart",
            "--data-dir",
            "/tmp/charts",
            "watch",
            "-i",
            "dotusdt",
            "-t",
            "5m",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/charts"));
        match cli.command {
            Commands::Watch {
                instrument,
                interval,
                ..
            } => {
                assert_eq!(instrument, Instrument::DotUsdt);
                assert_eq!(interval, Interval::FiveMinutes);
            }
            _ => panic!("expected Watch command"),
        }
    }

    #[test]
    fn parse_watch_rejects_unknown_instrument() {
        assert!(Cli::try_parse_from(["kline-chart", "watch", "-i", "btcusdt"]).is_err());
    }

    #[test]
    fn parse_show_args() {
        let cli =
            Cli::try_parse_from(["kline-chart", "show", "-i", "bnbusdt", "--limit", "10"]).unwrap();
        match cli.command {
            Commands::Show { instrument, limit } => {
                assert_eq!(instrument, Instrument::BnbUsdt);
                assert_eq!(limit, Some(10));
            }
            _ => panic!("expected Show command"),
        }
    }

    #[test]
    fn parse_clear_all() {
        let cli = Cli::try_parse_from(["kline-chart", "clear"]).unwrap();
        match cli.command {
            Commands::Clear { instrument } => assert!(instrument.is_none()),
            _ => panic!("expected Clear command"),
        }
    }

    #[test]
    fn user_event_parsing() {
        assert_eq!(
            parse_user_event("coin bnbusdt").unwrap(),
            Some(UserEvent::SelectInstrument(Instrument::BnbUsdt))
        );
        assert_eq!(
            parse_user_event("  tf 3m ").unwrap(),
            Some(UserEvent::SelectInterval(Interval::ThreeMinutes))
        );
        assert_eq!(parse_user_event("quit").unwrap(), Some(UserEvent::Quit));
        assert_eq!(parse_user_event("").unwrap(), None);
        assert!(parse_user_event("coin btcusdt").is_err());
        assert!(parse_user_event("tf").is_err());
        assert!(parse_user_event("dance").is_err());
    }

    #[test]
    fn forward_lines_stops_at_quit() {
        let (tx, mut rx) = mpsc::channel(8);
        let input = std::io::Cursor::new("coin bnbusdt\n\nbogus\ntf 5m\nquit\ncoin dotusdt\n");
        forward_lines(input, tx);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                UserEvent::SelectInstrument(Instrument::BnbUsdt),
                UserEvent::SelectInterval(Interval::FiveMinutes),
                UserEvent::Quit,
            ]
        );
    }

    #[test]
    fn forward_lines_returns_at_end_of_input() {
        let (tx, mut rx) = mpsc::channel(8);
        forward_lines(std::io::Cursor::new("tf 3m\n"), tx);

        assert_eq!(
            rx.try_recv().unwrap(),
            UserEvent::SelectInterval(Interval::ThreeMinutes)
        );
        // The reader returned and dropped its sender.
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn forward_lines_returns_when_event_loop_is_gone() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        // Would block forever on a real terminal if it kept reading.
        forward_lines(std::io::Cursor::new("coin bnbusdt\ncoin dotusdt\n"), tx);
    }

    #[test]
    fn tick_times_format_in_utc() {
        let tick = Tick {
            time: 1_736_951_400_000,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
        };
        assert_eq!(format_tick_time(&tick), "2025-01-15 14:30");
        assert_eq!(format_time(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn render_line_formats_latest_point() {
        let chart = ChartData {
            title: "ETHUSDT - 1m".to_string(),
            labels: vec![1_736_951_400_000],
            values: vec![3302.1],
        };
        assert_eq!(
            render_line(&chart),
            "ETHUSDT - 1m: 1 point(s), last 2025-01-15 14:30 close 3302.1"
        );
        assert_eq!(
            render_line(&ChartData {
                title: "DOTUSDT - 5m".to_string(),
                ..ChartData::default()
            }),
            "DOTUSDT - 5m: waiting for data"
        );
    }
}
