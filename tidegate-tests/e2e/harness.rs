//! Running gateway plus an authenticated HTTP client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tidegate_core::config::{AuthConfig, GatewayConfig};
use tidegate_core::{FileMetrics, ProgressCallback, TorrentMetrics};
use tidegate_sim::{SeedCatalog, SeedFile, SeedTorrent, SimulatedEngineBuilder, SimulationConfig};
use tidegate_web::Gateway;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "secret";

pub struct RunningGateway {
    pub gateway: Gateway,
    pub builder: Arc<SimulatedEngineBuilder>,
    pub addr: SocketAddr,
    pub magnet: String,
    pub reports: Arc<Mutex<Vec<FileMetrics>>>,
    pub http: reqwest::Client,
    _storage: tempfile::TempDir,
}

pub fn video() -> Vec<u8> {
    (0..4096u32).map(|i| (i * 7 % 256) as u8).collect()
}

pub fn scenario() -> SeedTorrent {
    SeedTorrent {
        name: "Scenario".to_string(),
        creation_date: 1_600_000_000,
        trackers: Vec::new(),
        files: vec![
            SeedFile::new("media/video.mkv", video()),
            SeedFile::new("readme.txt", b"hello".to_vec()),
        ],
    }
}

pub async fn start(simulation: SimulationConfig) -> RunningGateway {
    let storage = tempfile::tempdir().unwrap();
    let catalog = SeedCatalog::new();
    let magnet = catalog.seed(scenario()).to_uri();
    let builder = Arc::new(SimulatedEngineBuilder::new(catalog, simulation));

    let mut config = GatewayConfig::default();
    config.server.listen_address = "127.0.0.1:0".to_string();
    config.torrent.storage_dir = storage.path().to_path_buf();
    config.streaming.progress_interval = Duration::from_millis(10);
    config.streaming.chunk_size = 512;
    config.auth = AuthConfig::Static {
        username: USERNAME.to_string(),
        password: PASSWORD.to_string(),
    };

    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    let on_progress: ProgressCallback = Arc::new(move |_: &TorrentMetrics, file: &FileMetrics| {
        sink.lock().push(file.clone());
    });

    let gateway = Gateway::new(config, builder.clone(), on_progress);
    gateway.open().await.unwrap();
    let addr = gateway.local_addr().unwrap();

    RunningGateway {
        gateway,
        builder,
        addr,
        magnet,
        reports,
        http: reqwest::Client::new(),
        _storage: storage,
    }
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(self.url(path))
            .basic_auth(USERNAME, Some(PASSWORD))
    }

    pub fn info(&self) -> reqwest::RequestBuilder {
        self.get("/info").query(&[("magnet", self.magnet.as_str())])
    }

    pub fn stream(&self, path: &str) -> reqwest::RequestBuilder {
        self.get("/stream")
            .query(&[("magnet", self.magnet.as_str()), ("path", path)])
    }
}
