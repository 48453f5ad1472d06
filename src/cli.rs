//! Interface de linha de comando do MARLIN baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (launch, output,
//! status) e a flag global --verbose.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// MARLIN — Lançador de jobs da pipeline de processamento marinho.
#[derive(Debug, Parser)]
#[command(name = "marlin", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submete os jobs de um nível de processamento ao scheduler.
    Launch {
        /// Arquivo de configuração do nível (JSON ou TOML).
        config_file: PathBuf,

        /// Arquivo JSON de períodos da release (sid-dck -> anos).
        period_file: PathBuf,

        /// Lista de partições a processar, uma por linha.
        list_file: PathBuf,

        /// Resubmete apenas itens com falha ou nunca tentados.
        #[arg(long, short = 'f')]
        failed_only: bool,

        /// Encadeia um job de limpeza dos dados fonte da partição,
        /// executado somente se TODOS os jobs principais terminarem bem.
        #[arg(long, short = 'r')]
        remove_source: bool,

        /// Restringe o início do intervalo de anos.
        #[arg(long, short = 's')]
        start_year: Option<i32>,

        /// Restringe o fim do intervalo de anos.
        #[arg(long, short = 'e')]
        end_year: Option<i32>,

        /// Remove o descritor de entrada após o processamento do resultado.
        #[arg(long)]
        rm_input: bool,

        /// Projeto de contabilidade do Slurm (passado como -A).
        #[arg(long)]
        account: Option<String>,

        /// Executa os jobs localmente em vez de submeter ao Slurm.
        #[arg(long, conflicts_with = "dry_run")]
        run_local: bool,

        /// Enumera e valida sem submeter nem executar nada.
        #[arg(long)]
        dry_run: bool,
    },

    /// Processa o resultado de um job terminado (invocado pelo scheduler).
    Output {
        /// Caminho do descritor `<índice>.input` do item.
        descriptor: PathBuf,

        /// Código de saída do job principal observado pelo scheduler.
        exit_status: i32,

        /// Remove o descritor após o processamento.
        #[arg(long)]
        rm_input: bool,

        /// Arquivo de configuração do nível, para resolver os caminhos.
        #[arg(long, short = 'c')]
        config_file: Option<PathBuf>,
    },

    /// Mostra o estado persistido das partições de um nível.
    Status {
        /// Arquivo de configuração do nível (JSON ou TOML).
        config_file: PathBuf,

        /// Lista de partições a consultar, uma por linha.
        list_file: PathBuf,
    },
}
