//! Printable and serializable summary of one simulated boot

use beacon_mcu::sim::SimCycle;
use beacon_mcu::Phase;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle: u32,
    pub boot_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<String>,
    /// Reached `PoweringOff` rather than losing power part way
    pub completed: bool,
    pub boots: u32,
    pub off_count: u32,
    pub uptime_ms: u64,
    pub pushes: u32,
    /// Last advertising payload, hex
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    pub faults: Vec<String>,
}

impl CycleSummary {
    pub fn from_cycle(cycle: u32, sim: &SimCycle) -> Self {
        let report = &sim.report;
        Self {
            cycle,
            boot_reason: format!("{:?}", report.boot_reason),
            reset: report.reset.map(|r| format!("{:?}", r)),
            completed: report.phases.last() == Some(&Phase::PoweringOff),
            boots: report.snapshot.boots,
            off_count: report.snapshot.off_count,
            uptime_ms: report.snapshot.uptime_ms,
            pushes: report.pushes,
            payload: report
                .last_payload
                .map(|p| data_encoding::HEXLOWER.encode(p.as_bytes())),
            faults: report.faults.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn line(&self) -> String {
        let mut line = format!(
            "#{:<3} {:<11} boots={} off={} uptime={}ms pushes={}",
            self.cycle, self.boot_reason, self.boots, self.off_count, self.uptime_ms, self.pushes
        );
        if let Some(reset) = &self.reset {
            line.push_str(&format!(" reset={}", reset));
        }
        if !self.completed {
            line.push_str(" (power cut)");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_mcu::sim::SimDevice;
    use beacon_mcu::LifecycleConfig;

    #[test]
    fn first_boot_summary() {
        let mut device = SimDevice::new(LifecycleConfig {
            device_name: "Beacon".to_string(),
            active_window: std::time::Duration::from_millis(500),
            ..Default::default()
        });
        let summary = CycleSummary::from_cycle(1, &device.power_cycle());

        assert_eq!(summary.reset.as_deref(), Some("PowerOn"));
        assert!(summary.completed);
        assert_eq!(
            summary.payload.as_deref(),
            Some("0201060709426561636f6e0916d2fc443e01000000")
        );
        assert_eq!(
            summary.line(),
            "#1   PowerOn     boots=1 off=1 uptime=500ms pushes=1 reset=PowerOn"
        );

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["boots"], 1);
        assert_eq!(json["faults"], serde_json::json!([]));
    }
}
