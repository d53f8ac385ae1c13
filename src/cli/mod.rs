// CLI層 - コマンドライン引数の定義とサブコマンドの振り分け

pub mod args;
pub mod commands;

pub use args::*;
pub use commands::*;

use anyhow::Result;

/// 解析済みの引数からサブコマンドを実行し、終了コードを返す
pub fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Stress {
            threads,
            iterations,
            layer,
            mode,
            model,
            images,
            distinct_images,
            no_alias,
            continue_on_error,
            tolerance,
            config_preset,
            config,
            report,
            quiet,
        } => execute_stress(StressOptions {
            threads,
            iterations,
            layer,
            mode,
            model,
            images,
            distinct_images,
            no_alias,
            continue_on_error,
            tolerance,
            config_preset,
            config,
            report,
            quiet,
        }),
        Commands::Extract {
            input,
            output,
            layer,
            mode,
            model,
            log_every_nth,
            kernel_max_pooling,
        } => execute_extract(ExtractOptions {
            input,
            output,
            layers: parse_layer_list(&layer),
            mode,
            model,
            log_every_nth,
            kernel_max_pooling,
        }),
        Commands::Evaluate {
            features,
            annotations,
            distance,
            top_k,
            exclude_query_from_results,
            report,
        } => execute_evaluate(EvaluateOptions {
            features,
            annotations,
            distance: distance.parse()?,
            top_k,
            exclude_query: exclude_query_from_results,
            report,
        }),
        Commands::Layers { model } => execute_layers(model),
    }
}
