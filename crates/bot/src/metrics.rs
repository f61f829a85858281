use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, Opts};
use snipe_chain::ChannelMetrics;
use snipe_core::metrics::Metrics;
use snipe_core::ChainId;
use snipe_dex::WatcherMetrics;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

pub struct BotMetrics {
    metrics: Metrics,
    pub pairs: ChannelMetrics,
    pub watcher: WatcherMetrics,
    pub candidates_total: IntCounterVec,
    pub gate_verdicts_total: IntCounterVec,
    pub trades_total: IntCounterVec,
    pub sweep_errors_total: IntCounter,
}

impl BotMetrics {
    pub fn new() -> Result<Self> {
        let metrics = Metrics::new()?;
        let registry = metrics.registry();
        let pairs = ChannelMetrics::new(registry, "pairs")?;
        let watcher = WatcherMetrics::new(registry)?;
        let candidates_total = IntCounterVec::new(
            Opts::new("candidates_total", "Non-base tokens taken from new pairs"),
            &["chain"],
        )?;
        registry.register(Box::new(candidates_total.clone()))?;
        let gate_verdicts_total = IntCounterVec::new(
            Opts::new("gate_verdicts_total", "Liquidity gate verdicts by outcome"),
            &["chain", "verdict"],
        )?;
        registry.register(Box::new(gate_verdicts_total.clone()))?;
        let trades_total = IntCounterVec::new(
            Opts::new("trades_total", "Purchase sequences by final outcome"),
            &["chain", "outcome"],
        )?;
        registry.register(Box::new(trades_total.clone()))?;
        let sweep_errors_total = IntCounter::with_opts(Opts::new(
            "sweep_errors_total",
            "Sweeps that failed and triggered a cooldown",
        ))?;
        registry.register(Box::new(sweep_errors_total.clone()))?;

        Ok(Self {
            metrics,
            pairs,
            watcher,
            candidates_total,
            gate_verdicts_total,
            trades_total,
            sweep_errors_total,
        })
    }

    pub fn record_candidate(&self, chain: ChainId) {
        self.candidates_total
            .with_label_values(&[chain.to_string().as_str()])
            .inc();
    }

    pub fn record_verdict(&self, chain: ChainId, verdict: &str) {
        self.gate_verdicts_total
            .with_label_values(&[chain.to_string().as_str(), verdict])
            .inc();
    }

    pub fn record_trade(&self, chain: ChainId, outcome: &str) {
        self.trades_total
            .with_label_values(&[chain.to_string().as_str(), outcome])
            .inc();
    }

    pub fn gather(&self) -> String {
        self.metrics.gather()
    }
}

/// Serves the text exposition on every connection. Returns the bound address.
pub fn spawn_metrics_server(bind: &str, metrics: Arc<BotMetrics>) -> Result<SocketAddr> {
    let listener = TcpListener::bind(bind)?;
    let local = listener.local_addr()?;
    thread::spawn(move || {
        info!(bind = %local, "metrics server listening");
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(err) = handle_connection(stream, &metrics) {
                        warn!(?err, "metrics server connection failed");
                    }
                }
                Err(err) => {
                    warn!(?err, "metrics server accept failed");
                }
            }
        }
    });
    Ok(local)
}

fn handle_connection(mut stream: TcpStream, metrics: &BotMetrics) -> Result<()> {
    let mut buffer = [0u8; 512];
    let _ = stream.read(&mut buffer);
    let body = metrics.gather();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_exposes_prefixed_counters() {
        let metrics = Arc::new(BotMetrics::new().unwrap());
        metrics.record_candidate(ChainId::Bsc);
        metrics.record_trade(ChainId::Bsc, "succeeded");
        let addr = spawn_metrics_server("127.0.0.1:0", metrics).unwrap();

        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"GET /metrics HTTP/1.1\r\n\r\n").unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("snipe_candidates_total{chain=\"BSC\"} 1"));
        assert!(response.contains("snipe_trades_total{chain=\"BSC\",outcome=\"succeeded\"} 1"));
    }
}
