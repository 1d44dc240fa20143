//! Network path analysis and EC2 instance metadata

use crate::error::{AppError, Result};
use crate::models::InstanceMetadata;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;

/// Default IMDS endpoint
pub const IMDS_BASE_URL: &str = "http://169.254.169.254";

const IMDS_TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const IMDS_TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const IMDS_TOKEN_TTL_SECS: &str = "21600";

/// Limits applied to the external path tools
#[derive(Debug, Clone)]
pub struct PathAnalyzerConfig {
    pub traceroute_timeout: Duration,
    /// Per-hop wait passed to `traceroute -w`
    pub traceroute_wait_secs: u32,
    pub mtr_timeout: Duration,
    /// Report cycles passed to `mtr -c`
    pub mtr_cycles: u32,
}

impl Default for PathAnalyzerConfig {
    fn default() -> Self {
        Self {
            traceroute_timeout: Duration::from_secs(30),
            traceroute_wait_secs: 2,
            mtr_timeout: Duration::from_secs(60),
            mtr_cycles: 10,
        }
    }
}

/// One hop of a traced path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub index: u32,
    /// `None` when the hop did not answer
    pub address: Option<IpAddr>,
    pub rtt_ms: Option<f64>,
    /// Packet loss percentage (MTR only)
    pub loss_pct: Option<f64>,
}

/// Captured run of a single tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRun {
    pub tool: String,
    pub output: Option<String>,
    pub error: Option<String>,
    pub hops: Vec<Hop>,
}

impl ToolRun {
    fn failed(tool: &str, error: String) -> Self {
        Self {
            tool: tool.to_string(),
            output: None,
            error: Some(error),
            hops: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Traceroute and MTR results for one host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathReport {
    pub host: String,
    pub traceroute: ToolRun,
    pub mtr: ToolRun,
}

impl PathReport {
    /// Text block stored alongside sweep entries
    pub fn render(&self) -> String {
        let mut out = String::new();
        for run in [&self.traceroute, &self.mtr] {
            out.push_str(&format!("--- {} {} ---\n", run.tool, self.host));
            match (&run.output, &run.error) {
                (Some(text), _) => out.push_str(text.trim_end()),
                (None, Some(err)) => out.push_str(&format!("Error: {}", err)),
                (None, None) => {}
            }
            out.push('\n');
        }
        out
    }
}

/// Runs `traceroute` and `mtr` with bounded timeouts.
///
/// A missing binary or an expired timeout is reported in the
/// [`ToolRun`] rather than as an error, so a sweep keeps going.
#[derive(Debug, Clone, Default)]
pub struct PathAnalyzer {
    config: PathAnalyzerConfig,
}

impl PathAnalyzer {
    pub fn new(config: PathAnalyzerConfig) -> Self {
        Self { config }
    }

    pub async fn analyze(&self, host: &str) -> PathReport {
        PathReport {
            host: host.to_string(),
            traceroute: self.traceroute(host).await,
            mtr: self.mtr(host).await,
        }
    }

    pub async fn traceroute(&self, host: &str) -> ToolRun {
        let wait = self.config.traceroute_wait_secs.to_string();
        let args = ["-n", "-q", "1", "-w", wait.as_str(), host];
        let mut run = run_tool("traceroute", &args, self.config.traceroute_timeout).await;
        if let Some(text) = &run.output {
            run.hops = parse_traceroute(text);
        }
        run
    }

    pub async fn mtr(&self, host: &str) -> ToolRun {
        let cycles = self.config.mtr_cycles.to_string();
        let args = ["-r", "-c", cycles.as_str(), "-n", host];
        let mut run = run_tool("mtr", &args, self.config.mtr_timeout).await;
        if let Some(text) = &run.output {
            run.hops = parse_mtr(text);
        }
        run
    }
}

async fn run_tool(tool: &str, args: &[&str], limit: Duration) -> ToolRun {
    let child = Command::new(tool).args(args).kill_on_drop(true).output();

    match tokio::time::timeout(limit, child).await {
        Err(_) => ToolRun::failed(tool, format!("timed out after {}s", limit.as_secs())),
        Ok(Err(e)) => ToolRun::failed(tool, e.to_string()),
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let error = if output.status.success() {
                None
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Some(format!("exited with {}: {}", output.status, stderr.trim()))
            };
            ToolRun {
                tool: tool.to_string(),
                output: Some(stdout),
                error,
                hops: Vec::new(),
            }
        }
    }
}

fn traceroute_line() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+)\s+(?:(\*)|(\S+)\s+([\d.]+)\s*ms)").ok())
        .as_ref()
}

fn mtr_line() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    // "  3.|-- 10.0.0.1   0.0%    10    0.3   0.4   0.2   0.9   0.1"
    RE.get_or_init(|| Regex::new(r"^\s*(\d+)\.\|--\s+(\S+)\s+([\d.]+)%\s+\d+\s+[\d.]+\s+([\d.]+)").ok())
        .as_ref()
}

/// Hops from `traceroute -n -q 1` output; the header line is skipped
pub fn parse_traceroute(output: &str) -> Vec<Hop> {
    let Some(re) = traceroute_line() else {
        return Vec::new();
    };
    output
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            let index = caps.get(1)?.as_str().parse().ok()?;
            if caps.get(2).is_some() {
                return Some(Hop { index, address: None, rtt_ms: None, loss_pct: None });
            }
            Some(Hop {
                index,
                address: caps.get(3).and_then(|m| m.as_str().parse().ok()),
                rtt_ms: caps.get(4).and_then(|m| m.as_str().parse().ok()),
                loss_pct: None,
            })
        })
        .collect()
}

/// Hops from `mtr -r -n` report output, using the Avg column
pub fn parse_mtr(output: &str) -> Vec<Hop> {
    let Some(re) = mtr_line() else {
        return Vec::new();
    };
    output
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            Some(Hop {
                index: caps.get(1)?.as_str().parse().ok()?,
                address: caps.get(2).and_then(|m| m.as_str().parse().ok()),
                rtt_ms: caps.get(4).and_then(|m| m.as_str().parse().ok()),
                loss_pct: caps.get(3).and_then(|m| m.as_str().parse().ok()),
            })
        })
        .collect()
}

/// IMDSv2 client for the EC2 metadata service
#[derive(Debug, Clone)]
pub struct InstanceMetadataClient {
    base_url: String,
    client: Client,
}

impl InstanceMetadataClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(IMDS_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .no_proxy()
            .build()
            .map_err(|e| AppError::network(format!("Failed to create metadata client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Token failure is an error; individual missing fields are `None`
    pub async fn fetch(&self) -> Result<InstanceMetadata> {
        let token = self.token().await?;

        let mac = self
            .get(&token, "network/interfaces/macs/")
            .await
            .and_then(|body| body.lines().next().map(|l| l.trim().trim_end_matches('/').to_string()))
            .filter(|mac| !mac.is_empty());

        let (vpc_id, subnet_id) = match &mac {
            Some(mac) => (
                self.get(&token, &format!("network/interfaces/macs/{}/vpc-id", mac)).await,
                self.get(&token, &format!("network/interfaces/macs/{}/subnet-id", mac)).await,
            ),
            None => (None, None),
        };

        Ok(InstanceMetadata {
            instance_id: self.get(&token, "instance-id").await,
            instance_type: self.get(&token, "instance-type").await,
            availability_zone: self.get(&token, "placement/availability-zone").await,
            local_ipv4: self.get(&token, "local-ipv4").await,
            public_ipv4: self.get(&token, "public-ipv4").await,
            vpc_id,
            subnet_id,
        })
    }

    async fn token(&self) -> Result<String> {
        let response = self
            .client
            .put(format!("{}/latest/api/token", self.base_url))
            .header(IMDS_TOKEN_TTL_HEADER, IMDS_TOKEN_TTL_SECS)
            .send()
            .await
            .map_err(|e| AppError::network(format!("Instance metadata service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::http_request(format!(
                "Metadata token request returned {}",
                response.status()
            )));
        }
        Ok(response.text().await?.trim().to_string())
    }

    async fn get(&self, token: &str, path: &str) -> Option<String> {
        let response = self
            .client
            .get(format!("{}/latest/meta-data/{}", self.base_url, path))
            .header(IMDS_TOKEN_HEADER, token)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body = response.text().await.ok()?;
        Some(body.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TRACEROUTE: &str = "\
traceroute to api.binance.com (13.225.63.10), 30 hops max, 60 byte packets
 1  10.0.0.1  0.412 ms
 2  *
 3  52.93.28.150  1.207 ms
";

    const MTR: &str = "\
Start: 2024-05-01T10:00:00+0000
HOST: ip-10-0-0-12                Loss%   Snt   Last   Avg  Best  Wrst StDev
  1.|-- 10.0.0.1                   0.0%    10    0.3   0.4   0.2   0.9   0.1
  2.|-- ???                       100.0    10    0.0   0.0   0.0   0.0   0.0
  3.|-- 52.93.28.150              10.0%    10    1.2   1.5   1.1   2.8   0.5
";

    #[test]
    fn test_parse_traceroute() {
        let hops = parse_traceroute(TRACEROUTE);
        assert_eq!(hops.len(), 3);
        assert_eq!(hops[0].address, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(hops[0].rtt_ms, Some(0.412));
        assert_eq!(hops[1], Hop { index: 2, address: None, rtt_ms: None, loss_pct: None });
        assert_eq!(hops[2].index, 3);
    }

    #[test]
    fn test_parse_mtr() {
        let hops = parse_mtr(MTR);
        // the "???" line has no percent sign after the loss column
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0].rtt_ms, Some(0.4));
        assert_eq!(hops[1].index, 3);
        assert_eq!(hops[1].loss_pct, Some(10.0));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_traceroute("command not found").is_empty());
        assert!(parse_mtr("").is_empty());
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let run = run_tool("elp-definitely-not-installed", &["x"], Duration::from_secs(1)).await;
        assert!(!run.succeeded());
        assert!(run.output.is_none());
    }

    #[test]
    fn test_render_includes_errors() {
        let report = PathReport {
            host: "api.binance.com".into(),
            traceroute: ToolRun::failed("traceroute", "timed out after 30s".into()),
            mtr: ToolRun {
                tool: "mtr".into(),
                output: Some(MTR.into()),
                error: None,
                hops: parse_mtr(MTR),
            },
        };
        let text = report.render();
        assert!(text.contains("--- traceroute api.binance.com ---"));
        assert!(text.contains("Error: timed out after 30s"));
        assert!(text.contains("52.93.28.150"));
    }

    async fn mount_field(server: &MockServer, field: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/latest/meta-data/{}", field)))
            .and(header(IMDS_TOKEN_HEADER, "tok"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_instance_metadata_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/latest/api/token"))
            .and(header(IMDS_TOKEN_TTL_HEADER, IMDS_TOKEN_TTL_SECS))
            .respond_with(ResponseTemplate::new(200).set_body_string("tok"))
            .mount(&server)
            .await;
        mount_field(&server, "instance-id", "i-0abc").await;
        mount_field(&server, "instance-type", "c6in.large").await;
        mount_field(&server, "placement/availability-zone", "ap-northeast-1a").await;
        mount_field(&server, "local-ipv4", "10.0.0.12").await;
        mount_field(&server, "network/interfaces/macs/", "0a:1b:2c:3d:4e:5f/\n").await;
        mount_field(&server, "network/interfaces/macs/0a:1b:2c:3d:4e:5f/vpc-id", "vpc-123").await;
        mount_field(&server, "network/interfaces/macs/0a:1b:2c:3d:4e:5f/subnet-id", "subnet-9").await;

        let client = InstanceMetadataClient::with_base_url(server.uri()).unwrap();
        let meta = client.fetch().await.unwrap();

        assert_eq!(meta.instance_id.as_deref(), Some("i-0abc"));
        assert_eq!(meta.availability_zone.as_deref(), Some("ap-northeast-1a"));
        assert_eq!(meta.vpc_id.as_deref(), Some("vpc-123"));
        assert_eq!(meta.subnet_id.as_deref(), Some("subnet-9"));
        // not mounted
        assert_eq!(meta.public_ipv4, None);
    }

    #[tokio::test]
    async fn test_instance_metadata_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = InstanceMetadataClient::with_base_url(server.uri()).unwrap();
        let err = client.fetch().await.unwrap_err();
        assert_eq!(err.category(), "HTTP");
    }
}
