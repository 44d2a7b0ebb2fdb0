use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use foundation::ColorCache;
use formats::{parse_countries, parse_country_stats, parse_locations, sphere_bin};
use layers::{TextureImage, TextureRequest, Theme, build_texture};
use scene::{
    Country, CountryStats, DEFAULT_SPHERE_DIVISIONS, LocationSample, build_sphere, highest_count,
    max_country_visits,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Asset tooling for the traffic globe")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bake the subdivided sphere mesh into a binary file
    BakeSphere {
        /// Subdivision steps applied to the octahedron
        #[arg(long, default_value_t = DEFAULT_SPHERE_DIVISIONS)]
        divisions: u32,

        /// Output file
        #[arg(long, default_value = "sphere.bin")]
        out: PathBuf,
    },

    /// Summarize country, stats and location datasets
    Inspect {
        /// Countries GeoJSON (FeatureCollection)
        #[arg(long)]
        countries: Option<PathBuf>,

        /// Country visit counts, `{ "US": 123, .. }`
        #[arg(long)]
        stats: Option<PathBuf>,

        /// Location samples, `[{ lat, lng, count }, ..]`
        #[arg(long)]
        locations: Option<PathBuf>,

        /// A baked sphere mesh
        #[arg(long)]
        sphere: Option<PathBuf>,
    },

    /// Render the equirectangular surface texture to a binary PPM
    Texture {
        #[arg(long)]
        countries: PathBuf,

        #[arg(long)]
        stats: Option<PathBuf>,

        #[arg(long)]
        locations: Option<PathBuf>,

        /// Texture width in pixels (height is half)
        #[arg(long, default_value_t = 2048)]
        width: u32,

        /// Largest texture side the preview may use
        #[arg(long, default_value_t = 8192)]
        max_size: u32,

        /// light or dark
        #[arg(long, default_value = "light")]
        theme: String,

        #[arg(long, default_value = "texture.ppm")]
        out: PathBuf,
    },
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Command::BakeSphere { divisions, out } => bake_sphere(divisions, &out)?,
        Command::Inspect {
            countries,
            stats,
            locations,
            sphere,
        } => {
            if let Some(sphere) = sphere.as_deref() {
                inspect_sphere(sphere)?;
            }
            if sphere.is_none() || countries.is_some() || stats.is_some() || locations.is_some() {
                inspect(countries.as_deref(), stats.as_deref(), locations.as_deref())?;
            }
        }
        Command::Texture {
            countries,
            stats,
            locations,
            width,
            max_size,
            theme,
            out,
        } => {
            let theme = Theme::from_name(&theme).ok_or_else(|| format!("unknown theme {theme:?}"))?;
            let inputs = TextureInputs {
                countries: read_countries(&countries)?,
                stats: stats.as_deref().map(read_stats).transpose()?.unwrap_or_default(),
                locations: locations
                    .as_deref()
                    .map(read_locations)
                    .transpose()?
                    .unwrap_or_default(),
            };
            render_texture(&inputs, theme, width, max_size, &out)?;
        }
    }
    Ok(())
}

fn read_countries(path: &Path) -> CliResult<Vec<Country>> {
    Ok(parse_countries(&fs::read_to_string(path)?)?)
}

fn read_stats(path: &Path) -> CliResult<CountryStats> {
    Ok(parse_country_stats(&fs::read_to_string(path)?)?)
}

fn read_locations(path: &Path) -> CliResult<Vec<LocationSample>> {
    Ok(parse_locations(&fs::read_to_string(path)?)?)
}

fn bake_sphere(divisions: u32, out: &Path) -> CliResult<()> {
    let mesh = build_sphere(divisions)?;
    let bytes = sphere_bin::encode(&mesh)?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(out, &bytes)?;
    info!(
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        "wrote {} ({:.1} KB)",
        out.display(),
        bytes.len() as f64 / 1024.0
    );
    Ok(())
}

fn inspect_sphere(path: &Path) -> CliResult<()> {
    let mut file = fs::File::open(path)?;
    let mesh = sphere_bin::decode_from_reader(&mut file)?;
    info!(
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        "{}",
        path.display()
    );
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq)]
struct DatasetSummary {
    countries: usize,
    polygons: usize,
    rings: usize,
    vertices: usize,
    countries_with_stats: usize,
    max_visits: f64,
    locations: usize,
    highest_location_count: f64,
    total_location_count: f64,
}

fn summarize(
    countries: &[Country],
    stats: Option<&CountryStats>,
    locations: &[LocationSample],
) -> DatasetSummary {
    let polygons = countries.iter().map(|c| c.polygons.len()).sum();
    let rings = countries
        .iter()
        .flat_map(|c| &c.polygons)
        .map(|p| p.len())
        .sum();
    let vertices = countries
        .iter()
        .flat_map(|c| &c.polygons)
        .flatten()
        .map(|ring| ring.len())
        .sum();
    DatasetSummary {
        countries: countries.len(),
        polygons,
        rings,
        vertices,
        countries_with_stats: stats.map_or(0, |s| {
            countries.iter().filter(|c| s.contains_key(&c.code)).count()
        }),
        max_visits: stats.map_or(0.0, max_country_visits),
        locations: locations.len(),
        highest_location_count: if locations.is_empty() {
            0.0
        } else {
            highest_count(locations)
        },
        total_location_count: locations.iter().map(|l| l.count).sum(),
    }
}

fn inspect(
    countries: Option<&Path>,
    stats: Option<&Path>,
    locations: Option<&Path>,
) -> CliResult<()> {
    if countries.is_none() && stats.is_none() && locations.is_none() {
        warn!("nothing to inspect; pass --countries, --stats, --locations or --sphere");
        return Ok(());
    }
    let countries = countries.map(read_countries).transpose()?.unwrap_or_default();
    let stats = stats.map(read_stats).transpose()?;
    let locations = locations.map(read_locations).transpose()?.unwrap_or_default();

    let summary = summarize(&countries, stats.as_ref(), &locations);
    info!(
        countries = summary.countries,
        polygons = summary.polygons,
        rings = summary.rings,
        vertices = summary.vertices,
        "countries"
    );
    if stats.is_some() {
        info!(
            matched = summary.countries_with_stats,
            max_visits = summary.max_visits,
            "country stats"
        );
    }
    info!(
        samples = summary.locations,
        highest = summary.highest_location_count,
        total = summary.total_location_count,
        "locations"
    );
    Ok(())
}

struct TextureInputs {
    countries: Vec<Country>,
    stats: CountryStats,
    locations: Vec<LocationSample>,
}

fn render_texture(
    inputs: &TextureInputs,
    theme: Theme,
    width: u32,
    max_size: u32,
    out: &Path,
) -> CliResult<()> {
    let mut cache = ColorCache::new();
    let request = TextureRequest {
        countries: &inputs.countries,
        country_stats: &inputs.stats,
        max_visits: max_country_visits(&inputs.stats),
        colors: theme.palette().texture_colors(&mut cache),
        locations: &inputs.locations,
        highest_location_count: highest_count(&inputs.locations),
    };
    let (image, stats) = build_texture(&request, width, max_size)?;
    let mut file = fs::File::create(out)?;
    write_ppm(&image, &mut file)?;
    info!(
        width = image.width,
        height = image.height,
        country_hexes = stats.country_hexes,
        heat_hexes = stats.heat_hexes,
        "wrote {}",
        out.display()
    );
    Ok(())
}

/// Binary PPM (P6). Alpha is composited over white.
fn write_ppm<W: Write>(image: &TextureImage, w: &mut W) -> std::io::Result<()> {
    write!(w, "P6\n{} {}\n255\n", image.width, image.height)?;
    let mut rgb = Vec::with_capacity(image.rgba.len() / 4 * 3);
    for px in image.rgba.chunks_exact(4) {
        let a = px[3] as u32;
        for &c in &px[..3] {
            rgb.push(((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8);
        }
    }
    w.write_all(&rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn square(code: &str, lng: f64, lat: f64) -> Country {
        Country {
            code: code.to_string(),
            polygons: vec![vec![vec![
                [lng, lat],
                [lng + 10.0, lat],
                [lng + 10.0, lat + 10.0],
                [lng, lat + 10.0],
                [lng, lat],
            ]]],
        }
    }

    #[test]
    fn ppm_composites_over_white() {
        let image = TextureImage {
            width: 2,
            height: 1,
            rgba: vec![255, 0, 0, 255, 0, 0, 0, 0],
        };
        let mut out = Vec::new();
        write_ppm(&image, &mut out).unwrap();
        let header = b"P6\n2 1\n255\n";
        assert_eq!(&out[..header.len()], header);
        assert_eq!(&out[header.len()..], &[255, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn summary_counts_geometry_and_stats() {
        let countries = vec![square("US", -100.0, 30.0), square("FR", 0.0, 45.0)];
        let stats: CountryStats = [("US".to_string(), 40.0), ("ZZ".to_string(), 5.0)]
            .into_iter()
            .collect();
        let locations = vec![
            LocationSample::new(10.0, 10.0, 3.0),
            LocationSample::new(20.0, 20.0, 7.0),
        ];
        let summary = summarize(&countries, Some(&stats), &locations);
        assert_eq!(
            summary,
            DatasetSummary {
                countries: 2,
                polygons: 2,
                rings: 2,
                vertices: 10,
                countries_with_stats: 1,
                max_visits: 40.0,
                locations: 2,
                highest_location_count: 7.0,
                total_location_count: 10.0,
            }
        );
    }

    #[test]
    fn empty_inputs_summarize_to_zero() {
        assert_eq!(summarize(&[], None, &[]), DatasetSummary::default());
    }

    #[test]
    fn baked_sphere_decodes() {
        let path = std::env::temp_dir().join(format!("globe-tools-{}.bin", std::process::id()));
        bake_sphere(1, &path).unwrap();
        let mesh = sphere_bin::decode_from_reader(&mut fs::File::open(&path).unwrap()).unwrap();
        inspect_sphere(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(mesh, build_sphere(1).unwrap());
    }
}
