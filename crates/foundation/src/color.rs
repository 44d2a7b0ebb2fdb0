use std::collections::BTreeMap;

/// Normalized sRGB triple in `[0, 1]`.
pub type Rgb = [f32; 3];
/// Normalized sRGB plus alpha in `[0, 1]`.
pub type Rgba = [f32; 4];

pub const FALLBACK_GRAY: Rgb = [0.5, 0.5, 0.5];
pub const DEFAULT_COLOR_CACHE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorParseError {
    Empty,
    UnsupportedSyntax(String),
    BadComponent(String),
}

impl std::fmt::Display for ColorParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorParseError::Empty => write!(f, "empty color string"),
            ColorParseError::UnsupportedSyntax(s) => write!(f, "unsupported color syntax: {s}"),
            ColorParseError::BadComponent(s) => write!(f, "bad color component: {s}"),
        }
    }
}

impl std::error::Error for ColorParseError {}

/// Parses a CSS color into normalized RGB, falling back to neutral gray.
pub fn parse_color(css: &str) -> Rgb {
    match try_parse_color(css) {
        Ok([r, g, b, _]) => [r, g, b],
        Err(_) => FALLBACK_GRAY,
    }
}

/// Like [`parse_color`] but keeps the alpha channel (1.0 when absent).
pub fn parse_color_rgba(css: &str) -> Rgba {
    try_parse_color(css).unwrap_or([FALLBACK_GRAY[0], FALLBACK_GRAY[1], FALLBACK_GRAY[2], 1.0])
}

pub fn try_parse_color(css: &str) -> Result<Rgba, ColorParseError> {
    let s = css.trim().to_ascii_lowercase();
    if s.is_empty() {
        return Err(ColorParseError::Empty);
    }
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    let Some((name, args)) = split_function(&s) else {
        return Err(ColorParseError::UnsupportedSyntax(s));
    };
    match name {
        "oklch" => parse_oklch(args),
        "oklab" => parse_oklab(args),
        "rgb" | "rgba" => parse_rgb(args),
        _ => Err(ColorParseError::UnsupportedSyntax(s.clone())),
    }
}

fn split_function(s: &str) -> Option<(&str, &str)> {
    let open = s.find('(')?;
    let close = s.rfind(')')?;
    if close < open {
        return None;
    }
    Some((s[..open].trim(), &s[open + 1..close]))
}

/// Splits `a b c / d` or `a, b, c, d` into channel tokens and an optional alpha token.
fn split_args(args: &str) -> (Vec<&str>, Option<&str>) {
    let (channels, alpha) = match args.split_once('/') {
        Some((c, a)) => (c, Some(a.trim())),
        None => (args, None),
    };
    let mut tokens: Vec<&str> = channels
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();
    if alpha.is_none() && tokens.len() == 4 {
        let a = tokens.pop();
        return (tokens, a);
    }
    (tokens, alpha)
}

fn number(token: &str) -> Result<f64, ColorParseError> {
    if token == "none" {
        return Ok(0.0);
    }
    let t = token.trim_end_matches("deg");
    t.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ColorParseError::BadComponent(token.to_string()))
}

/// A number or a percentage of `percent_ref`.
fn number_or_percent(token: &str, percent_ref: f64) -> Result<f64, ColorParseError> {
    match token.strip_suffix('%') {
        Some(p) => Ok(number(p)? / 100.0 * percent_ref),
        None => number(token),
    }
}

fn parse_alpha(token: Option<&str>) -> Result<f32, ColorParseError> {
    match token {
        Some(t) => Ok(number_or_percent(t, 1.0)?.clamp(0.0, 1.0) as f32),
        None => Ok(1.0),
    }
}

fn parse_hex(hex: &str) -> Result<Rgba, ColorParseError> {
    let digits: Vec<u8> = hex
        .chars()
        .map(|c| c.to_digit(16).map(|d| d as u8))
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(|| ColorParseError::BadComponent(hex.to_string()))?;
    let channel = |hi: u8, lo: u8| f32::from(hi * 16 + lo) / 255.0;
    match digits.len() {
        3 => Ok([
            channel(digits[0], digits[0]),
            channel(digits[1], digits[1]),
            channel(digits[2], digits[2]),
            1.0,
        ]),
        6 | 8 => {
            let alpha = if digits.len() == 8 {
                channel(digits[6], digits[7])
            } else {
                1.0
            };
            Ok([
                channel(digits[0], digits[1]),
                channel(digits[2], digits[3]),
                channel(digits[4], digits[5]),
                alpha,
            ])
        }
        _ => Err(ColorParseError::UnsupportedSyntax(format!("#{hex}"))),
    }
}

fn parse_rgb(args: &str) -> Result<Rgba, ColorParseError> {
    let (tokens, alpha) = split_args(args);
    if tokens.len() != 3 {
        return Err(ColorParseError::UnsupportedSyntax(format!("rgb({args})")));
    }
    let mut rgb = [0.0f32; 3];
    for (slot, token) in rgb.iter_mut().zip(&tokens) {
        *slot = (number_or_percent(token, 255.0)?.clamp(0.0, 255.0) / 255.0) as f32;
    }
    Ok([rgb[0], rgb[1], rgb[2], parse_alpha(alpha)?])
}

fn parse_oklch(args: &str) -> Result<Rgba, ColorParseError> {
    let (tokens, alpha) = split_args(args);
    if tokens.len() != 3 {
        return Err(ColorParseError::UnsupportedSyntax(format!("oklch({args})")));
    }
    let l = number_or_percent(tokens[0], 1.0)?;
    let c = number_or_percent(tokens[1], 0.4)?.max(0.0);
    let h = number(tokens[2])?.to_radians();
    let rgb = oklab_to_srgb(l, c * h.cos(), c * h.sin());
    Ok([rgb[0], rgb[1], rgb[2], parse_alpha(alpha)?])
}

fn parse_oklab(args: &str) -> Result<Rgba, ColorParseError> {
    let (tokens, alpha) = split_args(args);
    if tokens.len() != 3 {
        return Err(ColorParseError::UnsupportedSyntax(format!("oklab({args})")));
    }
    let l = number_or_percent(tokens[0], 1.0)?;
    let a = number_or_percent(tokens[1], 0.4)?;
    let b = number_or_percent(tokens[2], 0.4)?;
    let rgb = oklab_to_srgb(l, a, b);
    Ok([rgb[0], rgb[1], rgb[2], parse_alpha(alpha)?])
}

/// OKLab to gamma-encoded sRGB, clamped and quantized to 8-bit steps the way
/// a rasterized canvas pixel would be.
fn oklab_to_srgb(l: f64, a: f64, b: f64) -> Rgb {
    let l_ = l + 0.396_337_777_4 * a + 0.215_803_757_3 * b;
    let m_ = l - 0.105_561_345_8 * a - 0.063_854_172_8 * b;
    let s_ = l - 0.089_484_177_5 * a - 1.291_485_548_0 * b;

    let (l3, m3, s3) = (l_ * l_ * l_, m_ * m_ * m_, s_ * s_ * s_);

    let linear = [
        4.076_741_662_1 * l3 - 3.307_711_591_3 * m3 + 0.230_969_929_2 * s3,
        -1.268_438_004_6 * l3 + 2.609_757_401_1 * m3 - 0.341_319_396_5 * s3,
        -0.004_196_086_3 * l3 - 0.703_418_614_7 * m3 + 1.707_614_701_0 * s3,
    ];

    linear.map(|c| {
        let encoded = if c <= 0.003_130_8 {
            12.92 * c
        } else {
            1.055 * c.powf(1.0 / 2.4) - 0.055
        };
        ((encoded.clamp(0.0, 1.0) * 255.0).round() / 255.0) as f32
    })
}

#[derive(Debug, Clone)]
struct CacheEntry {
    rgba: Rgba,
    last_used_tick: u64,
}

/// Bounded LRU of parsed colors, keyed by the exact input string.
///
/// Owned by whichever renderer uses it; there is no process-wide instance.
#[derive(Debug)]
pub struct ColorCache {
    capacity: usize,
    tick: u64,
    entries: BTreeMap<String, CacheEntry>,
}

impl Default for ColorCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_COLOR_CACHE_CAPACITY)
    }
}

impl ColorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, css: &str) -> bool {
        self.entries.contains_key(css)
    }

    pub fn rgb(&mut self, css: &str) -> Rgb {
        let [r, g, b, _] = self.rgba(css);
        [r, g, b]
    }

    pub fn rgba(&mut self, css: &str) -> Rgba {
        self.tick += 1;
        if let Some(entry) = self.entries.get_mut(css) {
            entry.last_used_tick = self.tick;
            return entry.rgba;
        }

        if self.entries.len() >= self.capacity {
            self.evict_least_recent();
        }
        let rgba = parse_color_rgba(css);
        self.entries.insert(
            css.to_string(),
            CacheEntry {
                rgba,
                last_used_tick: self.tick,
            },
        );
        rgba
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used_tick)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rgb_close(a: Rgb, b: Rgb, eps: f32) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() <= eps, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn parses_hex_and_rgb() {
        assert_rgb_close(parse_color("#ff8000"), [1.0, 128.0 / 255.0, 0.0], 1e-6);
        assert_rgb_close(parse_color("#0f0"), [0.0, 1.0, 0.0], 1e-6);
        assert_rgb_close(parse_color("rgb(255, 0, 51)"), [1.0, 0.0, 0.2], 1e-6);
        assert_rgb_close(parse_color("rgba(0,0,255,0.5)"), [0.0, 0.0, 1.0], 1e-6);
        assert_eq!(parse_color_rgba("rgba(0,0,255,0.5)")[3], 0.5);
    }

    #[test]
    fn oklch_white_black_and_orange() {
        assert_rgb_close(parse_color("oklch(1 0 0)"), [1.0, 1.0, 1.0], 1e-3);
        assert_rgb_close(parse_color("oklch(0 0 0)"), [0.0, 0.0, 0.0], 1e-6);
        // Warm amber used for traffic arcs.
        let [r, g, b] = parse_color("oklch(0.85 0.15 70)");
        assert!(r > g && g > b, "expected warm hue, got {r} {g} {b}");
    }

    #[test]
    fn oklch_alpha_suffix_is_kept() {
        let rgba = parse_color_rgba("oklch(0.723 0.219 149.579 / 35%)");
        assert!((rgba[3] - 0.35).abs() < 1e-6);
        assert!(rgba[1] > rgba[0], "green tier should be green");
    }

    #[test]
    fn unknown_syntax_falls_back_to_gray() {
        assert_eq!(parse_color("chartreuse"), FALLBACK_GRAY);
        assert_eq!(parse_color(""), FALLBACK_GRAY);
        assert_eq!(parse_color("#12345"), FALLBACK_GRAY);
        assert_eq!(parse_color("rgb(1, 2)"), FALLBACK_GRAY);
    }

    #[test]
    fn cached_results_are_bit_identical() {
        let mut cache = ColorCache::new();
        for css in ["oklch(0.45 0.24 40)", "#336699", "rgb(1, 2, 3)", "nonsense"] {
            let first = cache.rgb(css);
            let again = cache.rgb(css);
            let fresh = parse_color(css);
            assert_eq!(first.map(f32::to_bits), fresh.map(f32::to_bits));
            assert_eq!(again.map(f32::to_bits), fresh.map(f32::to_bits));
        }
    }

    #[test]
    fn sixty_fifth_key_evicts_exactly_the_least_recent() {
        let mut cache = ColorCache::new();
        for i in 0..64 {
            cache.rgb(&format!("rgb({i}, 0, 0)"));
        }
        assert_eq!(cache.len(), 64);

        // Touch the oldest so the second-oldest becomes the eviction victim.
        cache.rgb("rgb(0, 0, 0)");
        cache.rgb("rgb(200, 0, 0)");

        assert_eq!(cache.len(), 64);
        assert!(cache.contains("rgb(0, 0, 0)"));
        assert!(!cache.contains("rgb(1, 0, 0)"));
        assert!(cache.contains("rgb(2, 0, 0)"));
        assert!(cache.contains("rgb(200, 0, 0)"));
    }
}
