//! Interface de terminal do MARLIN — spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`LaunchProgress`] acompanha visualmente
//! uma invocação do launcher no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::launcher::{PartitionReport, SubmissionReport};
use crate::state_machine::SentinelSummary;

/// Indicador visual de progresso para uma invocação do launcher.
///
/// Exibe um spinner animado durante a submissão e linhas coloridas por
/// partição: verde para submissões, amarelo para itens pulados.
pub struct LaunchProgress {
    // Barra de progresso/spinner do indicatif.
    pb: ProgressBar,
    // Estilo verde para submissões bem-sucedidas.
    green: Style,
    // Estilo vermelho para erros.
    red: Style,
    // Estilo amarelo para avisos e itens pulados.
    yellow: Style,
}

impl LaunchProgress {
    /// Inicia o spinner com a descrição da invocação.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(format!("INIT: {description}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza a mensagem do spinner para a partição em submissão.
    #[allow(dead_code)]
    pub fn partition(&self, sid_dck: &str) {
        self.pb.set_message(format!("SUBMIT: {sid_dck}"));
    }

    /// Exibe o resumo de uma partição já submetida.
    pub fn partition_done(&self, report: &PartitionReport) {
        let mut line = format!(
            "  {} {}: {} task(s) submitted",
            self.green.apply_to("✓"),
            report.sid_dck,
            report.submitted
        );
        if report.skipped_succeeded > 0 {
            line.push_str(&format!(
                " {}",
                self.yellow
                    .apply_to(format!("({} already succeeded)", report.skipped_succeeded))
            ));
        }
        if report.cleanup_job.is_some() {
            line.push_str(" + cleanup");
        }
        self.pb.println(line);
    }

    /// Imprime uma linha acima do spinner sem interrompê-lo.
    pub fn println(&self, line: impl AsRef<str>) {
        self.pb.println(line);
    }

    /// Finaliza o spinner e imprime o relatório da invocação em JSON.
    pub fn finish(&self, report: &SubmissionReport) {
        self.pb.finish_and_clear();
        let total = report.total_submitted();
        if total > 0 {
            println!(
                "  {} {} task(s) submitted across {} partition(s)",
                self.green.apply_to("✓"),
                total,
                report.partitions.len()
            );
        } else {
            println!("  {} nothing to submit", self.yellow.apply_to("!"));
        }
        println!();
        println!("{}", self.green.apply_to("─── Submission Report ───"));
        println!(
            "{}",
            serde_json::to_string_pretty(report).unwrap_or_default()
        );
    }

    /// Exibe um erro fatal da invocação.
    pub fn fail(&self, message: &str) {
        self.pb.finish_and_clear();
        println!("  {} {message}", self.red.apply_to("✗"));
    }
}

/// Saída do subcomando `status`: uma linha por partição com a contagem de
/// sentinelas de sucesso e falha.
pub struct StatusView {
    green: Style,
    red: Style,
    yellow: Style,
}

impl StatusView {
    pub fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Imprime o estado persistido de uma partição.
    pub fn partition(&self, sid_dck: &str, summary: &SentinelSummary) {
        let marker = if summary.failed > 0 {
            self.red.apply_to("✗")
        } else if summary.succeeded > 0 {
            self.green.apply_to("✓")
        } else {
            self.yellow.apply_to("·")
        };
        println!(
            "  {marker} {sid_dck}: {} succeeded, {} failed",
            summary.succeeded, summary.failed
        );
    }
}

impl Default for StatusView {
    fn default() -> Self {
        Self::new()
    }
}
