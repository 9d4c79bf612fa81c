use std::path::PathBuf;

use ash::vk;
use log::warn;
use serde::{Deserialize, Serialize};
use ultraviolet::Vec3;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub scene_path: String,
    pub window_width: u32,
    pub window_height: u32,
    pub present_mode: PresentMode,
    #[serde(default)]
    pub cached: CachedData,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scene_path: "assets/scenes/spheres.gltf".to_string(),
            window_width: 800,
            window_height: 600,
            present_mode: PresentMode::Fifo,
            cached: CachedData::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CachedData {
    pub camera_position: Option<CameraPosition>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CameraPosition {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
}

impl PresentMode {
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
            PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        }
    }
}

pub struct ConfigFileLoader {
    pub path: PathBuf,
    config: Option<Config>,
}

impl ConfigFileLoader {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.into(),
            config: None,
        }
    }

    pub fn load_config(&mut self) -> &Config {
        let config = match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(error) => {
                    warn!(
                        "{} is not a valid config, using defaults: {error}",
                        self.path.display()
                    );
                    Config::default()
                }
            },
            Err(_) => {
                let config = Config::default();
                self.config = Some(config.clone());
                self.save_config();
                config
            }
        };
        self.config = Some(config);
        self.config.as_ref().unwrap()
    }

    pub fn update_cached_camera(&mut self, camera_position: CameraPosition) {
        if let Some(config) = self.config.as_mut() {
            config.cached.camera_position = Some(camera_position);
        }
        self.save_config();
    }

    pub fn save_config(&self) {
        if let Some(config) = &self.config {
            let content =
                serde_json::to_string_pretty(config).expect("Could not serialize config");
            if let Err(error) = std::fs::write(&self.path, content) {
                warn!("could not write {}: {error}", self.path.display());
            }
        }
    }
}
