//! Host metric producers backed by sysinfo

use beacon_agent::{MetricProducer, ProducerError};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};
use sysinfo::{Pid, ProcessesToUpdate, System};

const MB: u64 = 1024 * 1024;

fn percent(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Shared sysinfo handle for the producers that need refreshed state
#[derive(Clone)]
pub struct HostProbe {
    system: Arc<Mutex<System>>,
    pid: Option<Pid>,
}

impl HostProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes
        system.refresh_cpu_all();
        Self {
            system: Arc::new(Mutex::new(system)),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    fn with_system<T>(&self, f: impl FnOnce(&mut System) -> T) -> T {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut system)
    }

    /// Memory usage in MB, reported as a structured value
    pub fn memory(&self) -> MetricProducer {
        let probe = self.clone();
        MetricProducer::direct(move || {
            probe.with_system(|system| {
                system.refresh_memory();
                let total = system.total_memory();
                let used = system.used_memory();
                json!({
                    "total": total / MB,
                    "used": used / MB,
                    "available": system.available_memory() / MB,
                    "used_percent": percent(used, total),
                    "unit": "MB",
                })
            })
        })
    }

    /// Global CPU usage percent since the previous cycle
    pub fn cpu(&self) -> MetricProducer {
        let probe = self.clone();
        MetricProducer::direct(move || {
            probe.with_system(|system| {
                system.refresh_cpu_all();
                json!(system.global_cpu_usage())
            })
        })
    }

    /// Resident memory of this process in MB
    pub fn process_rss(&self) -> MetricProducer {
        let probe = self.clone();
        MetricProducer::callback(move |done| {
            let Some(pid) = probe.pid else {
                return done.fail("current pid unavailable");
            };
            let resident = probe.with_system(|system| {
                system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                system.process(pid).map(|process| process.memory())
            });
            match resident {
                Some(bytes) => done.ok(json!({"resident": bytes / MB, "unit": "MB"})),
                None => done.fail(format!("process {} not found", pid)),
            }
        })
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Load averages, read on the blocking pool and completed from there
pub fn load_average() -> MetricProducer {
    MetricProducer::callback(|done| {
        tokio::task::spawn_blocking(move || {
            let load = System::load_average();
            done.ok(json!({
                "one": load.one,
                "five": load.five,
                "fifteen": load.fifteen,
            }));
        });
    })
}

/// Seconds since boot
pub fn uptime() -> MetricProducer {
    MetricProducer::deferred(|| async { Ok::<Value, ProducerError>(json!(System::uptime())) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(1, 4), 25.0);
        assert_eq!(percent(5, 0), 0.0);
    }

    #[tokio::test]
    async fn test_memory_is_structured() {
        let value = HostProbe::new().memory().resolve().await.unwrap();
        assert_eq!(value["unit"], "MB");
        assert!(value["total"].as_u64().unwrap() >= value["used"].as_u64().unwrap());
    }

    #[tokio::test]
    async fn test_cpu_is_scalar() {
        let value = HostProbe::new().cpu().resolve().await.unwrap();
        assert!(!value.is_object());
    }

    #[tokio::test]
    async fn test_process_rss() {
        let value = HostProbe::new().process_rss().resolve().await.unwrap();
        assert_eq!(value["unit"], "MB");
        assert!(value["resident"].is_u64());
    }

    #[tokio::test]
    async fn test_load_average_completes() {
        let value = load_average().resolve().await.unwrap();
        assert!(value.get("one").is_some());
        assert!(value.get("fifteen").is_some());
    }

    #[tokio::test]
    async fn test_uptime() {
        let value = uptime().resolve().await.unwrap();
        assert!(value.is_u64());
    }
}
