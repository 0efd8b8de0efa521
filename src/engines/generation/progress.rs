use super::evolution_engine::{GenerationSummary, ProgressCallback};

pub struct ConsoleProgressCallback;

impl ProgressCallback for ConsoleProgressCallback {
    fn on_generation_start(&mut self, generation: usize, tasks: usize) {
        log::info!("Generation {} starting, {} simulations queued", generation, tasks);
    }

    fn on_generation_complete(&mut self, summary: &GenerationSummary) {
        log::info!(
            "Generation {} complete. Evaluated: {}, degraded: {}, replaced: {}, leaderboard: {}",
            summary.generation,
            summary.evaluated,
            summary.degraded,
            summary.deaths,
            summary.leaderboard_size
        );
        if let Some(best) = summary.best_fitness {
            log::info!("Best fitness: {:.4}", best);
        }
        if !summary.exported.is_empty() {
            log::info!("Exported: {}", summary.exported.join(", "));
        }
    }
}

// For driving a run from another thread
pub struct ChannelProgressCallback {
    sender: std::sync::mpsc::Sender<ProgressMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    GenerationStart { generation: usize, tasks: usize },
    GenerationComplete(GenerationSummary),
}

impl ChannelProgressCallback {
    pub fn new(sender: std::sync::mpsc::Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_generation_start(&mut self, generation: usize, tasks: usize) {
        let _ = self
            .sender
            .send(ProgressMessage::GenerationStart { generation, tasks });
    }

    fn on_generation_complete(&mut self, summary: &GenerationSummary) {
        let _ = self
            .sender
            .send(ProgressMessage::GenerationComplete(summary.clone()));
    }
}
