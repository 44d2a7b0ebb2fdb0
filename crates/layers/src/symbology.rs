use foundation::{ColorCache, Rgb, Rgba};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }

    pub fn palette(self) -> Palette {
        match self {
            Theme::Light => LIGHT,
            Theme::Dark => DARK,
        }
    }
}

/// CSS colors for one theme.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Palette {
    pub globe_fill: &'static str,
    pub globe_stroke: &'static str,
    pub graticule_stroke: &'static str,
    pub country_stroke: &'static str,
    pub no_data: &'static str,
    pub no_data_stroke: &'static str,
    /// Low, medium and high visit tiers.
    pub country_tiers: [&'static str; 3],
    /// Heatmap density tiers, lightest first.
    pub heatmap_tiers: [&'static str; 5],
    pub arc: &'static str,
}

impl Default for Palette {
    fn default() -> Self {
        Theme::default().palette()
    }
}

pub const LIGHT: Palette = Palette {
    globe_fill: "oklch(0.95 0.002 286)",
    globe_stroke: "oklch(0.75 0.006 286 / 20%)",
    graticule_stroke: "oklch(0.75 0.006 286 / 30%)",
    country_stroke: "oklch(0.8 0.004 286 / 20%)",
    no_data: "oklch(0.88 0.003 286)",
    no_data_stroke: "oklch(0.82 0.003 286)",
    country_tiers: [
        "oklch(0.723 0.219 149.579 / 40%)",
        "oklch(0.723 0.219 149.579 / 60%)",
        "oklch(0.723 0.219 149.579 / 80%)",
    ],
    heatmap_tiers: [
        "oklch(0.82 0.12 72)",
        "oklch(0.75 0.16 65)",
        "oklch(0.65 0.2 55)",
        "oklch(0.55 0.24 45)",
        "oklch(0.48 0.26 38)",
    ],
    arc: "oklch(0.8 0.12 65)",
};

pub const DARK: Palette = Palette {
    globe_fill: "oklch(0.3 0.005 286)",
    globe_stroke: "oklch(0.4 0.01 286 / 25%)",
    graticule_stroke: "oklch(0.35 0.01 286 / 30%)",
    country_stroke: "oklch(0.5 0.005 286 / 30%)",
    no_data: "oklch(0.4 0.005 286)",
    no_data_stroke: "oklch(0.5 0.005 286)",
    country_tiers: [
        "oklch(0.723 0.219 149.579 / 35%)",
        "oklch(0.723 0.219 149.579 / 55%)",
        "oklch(0.723 0.219 149.579 / 75%)",
    ],
    heatmap_tiers: [
        "oklch(0.82 0.1 75)",
        "oklch(0.75 0.14 68)",
        "oklch(0.65 0.18 58)",
        "oklch(0.55 0.22 48)",
        "oklch(0.45 0.24 40)",
    ],
    arc: "oklch(0.85 0.15 70)",
};

/// Colors the texture builder needs, already resolved.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TextureColors {
    pub globe_fill: Rgba,
    pub no_data: Rgba,
    pub country_tiers: [Rgba; 3],
    pub heatmap_tiers: [Rgba; 5],
}

impl Palette {
    pub fn texture_colors(&self, cache: &mut ColorCache) -> TextureColors {
        TextureColors {
            globe_fill: cache.rgba(self.globe_fill),
            no_data: cache.rgba(self.no_data),
            country_tiers: self.country_tiers.map(|c| cache.rgba(c)),
            heatmap_tiers: self.heatmap_tiers.map(|c| cache.rgba(c)),
        }
    }

    pub fn arc_color(&self, cache: &mut ColorCache) -> Rgb {
        cache.rgb(self.arc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn themes_resolve_by_name() {
        assert_eq!(Theme::from_name("Dark"), Some(Theme::Dark));
        assert_eq!(Theme::from_name(" light "), Some(Theme::Light));
        assert_eq!(Theme::from_name("sepia"), None);
        assert_ne!(Theme::Light.palette(), Theme::Dark.palette());
    }

    #[test]
    fn tier_alphas_increase() {
        let mut cache = ColorCache::new();
        for theme in [Theme::Light, Theme::Dark] {
            let colors = theme.palette().texture_colors(&mut cache);
            let alphas = colors.country_tiers.map(|c| c[3]);
            assert!(alphas[0] < alphas[1] && alphas[1] < alphas[2], "{alphas:?}");
            assert_eq!(colors.globe_fill[3], 1.0);
        }
        assert!(cache.len() <= cache.capacity());
    }

    #[test]
    fn dark_globe_is_darker() {
        let mut cache = ColorCache::new();
        let light = LIGHT.texture_colors(&mut cache).globe_fill;
        let dark = DARK.texture_colors(&mut cache).globe_fill;
        assert!(dark[0] < light[0]);
        let arc = DARK.arc_color(&mut cache);
        assert!(arc[0] > arc[2], "arc should be warm: {arc:?}");
    }
}
