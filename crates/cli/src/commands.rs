use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Copy rows from a CSV file into the data nodes of a partitioned table
    Copy {
        #[arg(long, help = "Copy settings file path (JSON)")]
        config: String,

        #[arg(long, help = "CSV file with a header row")]
        input: String,

        #[arg(long, help = "Directory receiving one COPY stream per data node")]
        out_dir: String,

        #[arg(long, default_value_t = ',', help = "Field delimiter of the input file")]
        delimiter: char,

        #[arg(
            long,
            help = "If specified, writes the JSON summary to this file instead of stdout"
        )]
        output: Option<String>,
    },
    /// Print the COPY statement sent to every data node
    Command {
        #[arg(long, help = "Copy settings file path (JSON)")]
        config: String,
    },
}
