use std::path::PathBuf;

use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use structopt::StructOpt;

use carver::carving::{carve, CarveParams};
use carver::export_ply::PlyFormat;
use carver::mask::MaskParams;
use carver::pipeline::{
    reconstruct_mesh, write_mesh, write_points, MeshFormat,
    ReconstructionParams,
};
use carver::view::{load_views, read_view_manifest, View, ViewSource};
use base::defs::Result;
use base::util::cli::parse_key_val;

#[derive(StructOpt)]
#[structopt(about = "Turntable silhouette carver")]
struct Opts {
    #[structopt(help = "Print debug messages", long, short = "v")]
    verbose: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    Reconstruct(ReconstructCommand),
    Carve(CarveCommand),
}

#[derive(StructOpt)]
struct ViewsInput {
    #[structopt(
        help = "View image with its turntable angle in degrees (path=angle)",
        long = "view",
        number_of_values = 1,
        parse(try_from_str = parse_key_val)
    )]
    views: Vec<(PathBuf, f64)>,

    #[structopt(
        help = "JSON file listing views as {\"image\": ..., \"angle\": ...}",
        long,
        short = "f"
    )]
    views_file: Option<PathBuf>,
}

impl ViewsInput {
    fn load(&self, params: &MaskParams) -> Result<Vec<View>> {
        let mut sources = match &self.views_file {
            Some(path) => read_view_manifest(path)?,
            None => Vec::new(),
        };
        sources.extend(self.views.iter().map(|(path, angle)| ViewSource {
            path: path.clone(),
            angle_degrees: *angle,
        }));
        load_views(&sources, params)
    }
}

#[derive(StructOpt)]
#[structopt(about = "Reconstruct a colored mesh from turntable views")]
struct ReconstructCommand {
    #[structopt(flatten)]
    input: ViewsInput,

    #[structopt(help = "Output mesh file (.ply or .obj)", long, short = "o")]
    output: PathBuf,

    #[structopt(help = "Write ASCII instead of binary PLY", long)]
    ascii: bool,

    #[structopt(flatten)]
    params: ReconstructionParams,
}

impl ReconstructCommand {
    fn run(&self) -> Result<()> {
        let views = self.input.load(&self.params.mask)?;
        let mesh = reconstruct_mesh(&views, &self.params)?;
        let format = MeshFormat::from_path(&self.output, self.ascii);
        write_mesh(&mesh, &self.output, format)
    }
}

#[derive(StructOpt)]
#[structopt(about = "Carve turntable views and write occupied voxel centres")]
struct CarveCommand {
    #[structopt(flatten)]
    input: ViewsInput,

    #[structopt(help = "Output point set file (.ply)", long, short = "o")]
    output: PathBuf,

    #[structopt(help = "Write ASCII instead of binary PLY", long)]
    ascii: bool,

    #[structopt(flatten)]
    mask: MaskParams,

    #[structopt(flatten)]
    carve: CarveParams,
}

impl CarveCommand {
    fn run(&self) -> Result<()> {
        let views = self.input.load(&self.mask)?;
        let grid = carve(&views, &self.carve)?;
        let format = if self.ascii {
            PlyFormat::Ascii
        } else {
            PlyFormat::BinaryLittleEndian
        };
        write_points(&grid.occupied_points(), &self.output, format)
    }
}

fn main() {
    let opts = Opts::from_args();

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(err) = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("warning: failed to initialize logger: {}", err);
    }

    let res = match &opts.command {
        Command::Reconstruct(command) => command.run(),
        Command::Carve(command) => command.run(),
    };

    if let Err(err) = res {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
