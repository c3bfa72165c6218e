pub mod robust;
pub mod sector;
pub mod weighted;

pub use robust::{
    median_filter, median_in_place, nan_median, nan_std, robust_stats, sigma_clipped_stats,
    ClippedStats, RobustStats,
};
pub use sector::{polar_angle_deg, sector_stats, AnnularSector, SectorStats};
pub use weighted::weighted_std;
