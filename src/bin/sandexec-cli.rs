//! sandexec CLI client
//!
//! Sends tool invocations to the sandexec daemon over UDP. Runs a single
//! call when a tool name is given on the command line, otherwise starts a
//! rustyline prompt that reads `<tool> [json arguments]` lines.

use clap::Parser;
use rmp_serde::decode::Deserializer;
use rmp_serde::encode::Serializer;
use rustyline::Editor;
use rustyline::history::FileHistory;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const HEADER_LEN: usize = 5;

const TOOL_NAMES: [&str; 4] = [
    "execute_command",
    "execute_file",
    "execute_code",
    "execution_status",
];

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
enum MsgType {
    Request = 0x01,
    RequestAck = 0x02,
    Response = 0x03,
}

#[derive(Debug, Serialize)]
struct RequestPayload {
    tool: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ResponsePayload {
    content: String,
    is_error: bool,
}

#[derive(Debug, Parser)]
#[command(name = "sandexec-cli")]
#[command(about = "Send execution tool calls to the sandexec daemon")]
struct Args {
    /// Daemon address
    #[arg(short, long, default_value = "127.0.0.1:9710")]
    target: SocketAddr,

    /// ACK timeout in seconds
    #[arg(long, default_value = "5")]
    timeout: u64,

    /// How long to wait for a tool result, in seconds
    #[arg(long, default_value = "330")]
    response_timeout: u64,

    /// Maximum retry attempts
    #[arg(short, long, default_value = "3")]
    max_retries: u32,

    /// History file path
    #[arg(long)]
    history_file: Option<PathBuf>,

    /// Print the raw JSON instead of pretty-printing it
    #[arg(long)]
    raw: bool,

    /// Tool to call once and exit
    tool: Option<String>,

    /// JSON arguments for the one-shot call
    arguments: Option<String>,
}

#[derive(Debug, Clone)]
struct Config {
    target: SocketAddr,
    ack_timeout_secs: u64,
    response_timeout_secs: u64,
    max_retries: u32,
    history_file: PathBuf,
    raw: bool,
}

impl Config {
    fn from_args(args: &Args) -> Self {
        let history_file = args.history_file.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|p| p.join(".sandexec_history"))
                .unwrap_or_else(|| PathBuf::from(".sandexec_history"))
        });

        Self {
            target: args.target,
            ack_timeout_secs: args.timeout,
            response_timeout_secs: args.response_timeout,
            max_retries: args.max_retries.max(1),
            history_file,
            raw: args.raw,
        }
    }
}

struct Client {
    socket: UdpSocket,
    config: Config,
    seq: AtomicU32,
}

impl Client {
    async fn new(config: Config) -> io::Result<Self> {
        let bind = if config.target.is_ipv6() {
            "[::]:0"
        } else {
            "0.0.0.0:0"
        };
        let socket = UdpSocket::bind(bind).await?;

        Ok(Self {
            socket,
            config,
            seq: AtomicU32::new(1),
        })
    }

    /// Send a tool call and wait for its result, retrying unacknowledged sends
    async fn call(&self, tool: &str, arguments: &str) -> io::Result<ResponsePayload> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);

        let payload = RequestPayload {
            tool: tool.to_string(),
            arguments: arguments.to_string(),
        };
        let mut packet = vec![MsgType::Request as u8];
        packet.extend_from_slice(&seq.to_be_bytes());
        {
            let mut ser = Serializer::new(&mut packet).with_struct_map();
            payload
                .serialize(&mut ser)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        }

        for _attempt in 0..self.config.max_retries {
            self.socket.send_to(&packet, self.config.target).await?;

            match self.wait_for(seq, Duration::from_secs(self.config.ack_timeout_secs)).await {
                Ok(Reply::Ack) => {
                    // Retransmits of the same seq are answered from the daemon's cache
                    match self
                        .wait_for(seq, Duration::from_secs(self.config.response_timeout_secs))
                        .await
                    {
                        Ok(Reply::Response(response)) => return Ok(response),
                        Ok(Reply::Ack) | Err(_) => {
                            eprintln!("[warning] Response timeout, retrying...");
                            continue;
                        }
                    }
                }
                // Lost ACK but the result already arrived
                Ok(Reply::Response(response)) => return Ok(response),
                Err(_) => continue,
            }
        }

        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "sandexec not responding",
        ))
    }

    /// Wait for the next packet carrying `expected_seq`, skipping stray ones
    async fn wait_for(&self, expected_seq: u32, wait: Duration) -> io::Result<Reply> {
        let mut buf = vec![0u8; 65536];
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let (len, addr) = match timeout(remaining, self.socket.recv_from(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
            };

            if addr != self.config.target || len < HEADER_LEN {
                continue;
            }
            let seq = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
            if seq != expected_seq {
                continue;
            }

            match buf[0] {
                t if t == MsgType::RequestAck as u8 => return Ok(Reply::Ack),
                t if t == MsgType::Response as u8 => {
                    let mut de = Deserializer::new(&buf[HEADER_LEN..len]);
                    let payload: ResponsePayload = Deserialize::deserialize(&mut de)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    return Ok(Reply::Response(payload));
                }
                _ => continue,
            }
        }
    }
}

enum Reply {
    Ack,
    Response(ResponsePayload),
}

/// Split a prompt line into tool name and JSON arguments
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.split_once(char::is_whitespace) {
        Some((tool, rest)) => Some((tool, rest.trim())),
        None => Some((line, "")),
    }
}

fn render(response: &ResponsePayload, raw: bool) -> String {
    if raw {
        return response.content.clone();
    }
    serde_json::from_str::<serde_json::Value>(&response.content)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| response.content.clone())
}

fn print_response(response: &ResponsePayload, raw: bool) {
    let text = render(response, raw);
    if response.is_error {
        println!("[error] {}", text);
    } else {
        println!("{}", text);
    }
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    let config = Config::from_args(&args);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        match args.tool {
            Some(tool) => run_once(config, &tool, args.arguments.as_deref().unwrap_or("")).await,
            None => run_repl(config).await,
        }
    })
}

async fn run_once(config: Config, tool: &str, arguments: &str) -> io::Result<()> {
    let raw = config.raw;
    let client = Client::new(config).await?;
    let response = client.call(tool, arguments).await?;
    print_response(&response, raw);
    if response.is_error {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_repl(config: Config) -> io::Result<()> {
    let client = Client::new(config.clone()).await?;

    let mut rl: Editor<(), FileHistory> = Editor::new().map_err(io::Error::other)?;
    if config.history_file.exists()
        && let Err(e) = rl.load_history(&config.history_file)
    {
        eprintln!("[warning] Failed to load history: {}", e);
    }

    println!("sandexec-cli v{}", env!("CARGO_PKG_VERSION"));
    println!("Target: {}", client.config.target);
    println!("Enter `<tool> [json arguments]`, `help` for tools. Ctrl+D to quit.");
    println!();

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                let Some((tool, arguments)) = parse_line(&line) else {
                    continue;
                };
                let _ = rl.add_history_entry(line.trim());

                if tool == "help" {
                    for name in TOOL_NAMES {
                        println!("  {}", name);
                    }
                    continue;
                }

                print!("[running...]");
                io::stdout().flush()?;

                let result = client.call(tool, arguments).await;
                print!("\r");
                match result {
                    Ok(response) => print_response(&response, config.raw),
                    Err(e) => println!("[error] {}", e),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("[error] Readline error: {}", e);
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(&config.history_file) {
        eprintln!("[warning] Failed to save history: {}", e);
    }

    println!("\nGoodbye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_with_arguments() {
        let (tool, args) = parse_line("  execute_command {\"command\":\"ls\"} ").unwrap();
        assert_eq!(tool, "execute_command");
        assert_eq!(args, "{\"command\":\"ls\"}");
    }

    #[test]
    fn test_parse_line_tool_only() {
        assert_eq!(parse_line("execution_status"), Some(("execution_status", "")));
        assert_eq!(parse_line("   "), None);
    }

    #[test]
    fn test_render_pretty_prints_json() {
        let response = ResponsePayload {
            content: "{\"success\":true}".to_string(),
            is_error: false,
        };
        assert_eq!(render(&response, false), "{\n  \"success\": true\n}");
        assert_eq!(render(&response, true), "{\"success\":true}");
    }

    #[test]
    fn test_render_keeps_plain_text() {
        let response = ResponsePayload {
            content: "Response timeout".to_string(),
            is_error: true,
        };
        assert_eq!(render(&response, false), "Response timeout");
    }
}
