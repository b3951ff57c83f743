/// Rendering layer: from coordinates to pixels.
///
/// Architecture:
/// ```text
///   x / y columns ─┐        polylines ─┐
///                  ▼                   ▼
///            ┌──────────┐        ┌──────────┐
///            │  canvas   │ points │  canvas   │ lines
///            └──────────┘        └──────────┘
///                  │ reduction        │ counts
///                  ▼                   ▼
///            ┌──────────────────────────────┐
///            │  shade    spread / stack / bg │
///            └──────────────────────────────┘
///                  │                   │
///                  ▼                   ▼
///            ┌──────────┐        ┌──────────┐
///            │  image    │        │  figure   │ frame + colorbar
///            └──────────┘        └──────────┘
/// ```

pub mod canvas;
pub mod figure;
pub mod image;
pub mod reduction;
pub mod shade;
