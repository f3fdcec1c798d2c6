use std::io::{self, Write};
use std::time::Instant;

/// Checkpoints de progreso para recorridos largos de filas/registros.
///
/// Reporta en la misma línea (con `\r`) cada `checkpoint_every` elementos;
/// el reporte es solo observabilidad, nunca afecta el resultado.
pub struct ProgressTracker {
    start_time: Instant,
    checkpoint_every: u64,
    total_seen: u64,
    label: &'static str,
}

impl ProgressTracker {
    pub fn new(label: &'static str, checkpoint_every: u64) -> Self {
        ProgressTracker {
            start_time: Instant::now(),
            checkpoint_every,
            total_seen: 0,
            label,
        }
    }

    pub fn update(&mut self, seen: u64) {
        self.total_seen = seen;

        if self.total_seen % self.checkpoint_every == 0 {
            self.report();
        }
    }

    fn report(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.total_seen as f64 / elapsed
        } else {
            0.0
        };

        print!(
            "\r📊 {}: {} | {:.0}/s | {:.1}s",
            self.label, self.total_seen, rate, elapsed
        );
        io::stdout().flush().ok();
    }

    /// Cierra la línea de progreso con el total final.
    pub fn finish(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        println!(
            "\r✅ {}: {} en {:.1}s          ",
            self.label, self.total_seen, elapsed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_keeps_last_total() {
        let mut progress = ProgressTracker::new("filas", 1_000);
        progress.update(10);
        progress.update(999);
        assert_eq!(progress.total_seen, 999);
    }
}
