//! Tiled map ingestion. Deserializes `.tmj` (Tiled JSON) files and distills them into a
//! `LevelDescriptor`: ordered tile layers plus typed spawn records.
//!
//! Layer roles are decided by position, not by name: the first tile layer is the background and
//! the second one is the collidable platform layer. Authored maps must respect that ordering.

use bevy::asset::io::Reader;
use bevy::asset::{AssetLoader, AsyncReadExt, LoadContext};
use bevy::prelude::*;
use serde::Deserialize;
use thiserror::Error;

use crate::level::LevelId;

/// Tiled stores horizontal/vertical/diagonal flip flags in the top bits of every gid.
const GID_FLIP_MASK: u32 = 0x1FFF_FFFF;

/// Registers the `.tmj` asset type and loader.
pub struct MapPlugin;

impl Plugin for MapPlugin {
    fn build(&self, app: &mut App) {
        app.init_asset::<TiledMapAsset>()
            .init_asset_loader::<TiledMapLoader>();
    }
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("could not read map file: {0}")]
    Io(#[from] std::io::Error),
    #[error("map is not valid Tiled JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("map needs a background and a platform tile layer, found {found} tile layer(s)")]
    MissingTileLayers { found: usize },
    #[error("tile layer '{layer}' uses unsupported '{encoding}' encoding; export as CSV")]
    UnsupportedEncoding { layer: String, encoding: String },
    #[error("{what} of {width}x{height} is too large")]
    Oversized {
        what: &'static str,
        width: u32,
        height: u32,
    },
    #[error("tile layer '{layer}' has {actual} tiles, expected {expected}")]
    LayerSize {
        layer: String,
        expected: usize,
        actual: usize,
    },
}

// --- Raw Tiled JSON ------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TiledMap {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "tilewidth")]
    pub tile_width: u32,
    #[serde(rename = "tileheight")]
    pub tile_height: u32,
    #[serde(default)]
    pub layers: Vec<TiledLayer>,
    #[serde(default)]
    pub tilesets: Vec<TiledTileset>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum TiledLayer {
    #[serde(rename = "tilelayer")]
    Tiles(TiledTileLayer),
    #[serde(rename = "objectgroup")]
    Objects(TiledObjectLayer),
    /// Image and group layers carry nothing gameplay needs.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TiledTileLayer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub encoding: Option<String>,
    pub data: TiledTileData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TiledTileData {
    Gids(Vec<u32>),
    /// Base64 (optionally compressed) payload. Only its presence matters.
    Encoded(serde::de::IgnoredAny),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TiledObjectLayer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub objects: Vec<TiledObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TiledObject {
    #[serde(default)]
    pub name: String,
    /// Tiled 1.9 briefly exported this field as `class`.
    #[serde(default, rename = "type", alias = "class")]
    pub kind: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TiledTileset {
    #[serde(rename = "firstgid")]
    pub first_gid: u32,
    #[serde(default)]
    pub columns: u32,
    #[serde(default, rename = "tilewidth")]
    pub tile_width: u32,
    #[serde(default, rename = "tileheight")]
    pub tile_height: u32,
}

// --- Distilled level data ------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnKind {
    PlayerSpawn,
    Collectible,
    Exit,
}

impl SpawnKind {
    /// Object classification. Order matters: a player marker wins over anything else, and stars
    /// are only recognised by type.
    pub fn classify(name: &str, kind: &str) -> Option<Self> {
        if name == "player" || name == "dude" || kind == "player" {
            Some(Self::PlayerSpawn)
        } else if kind == "star" {
            Some(Self::Collectible)
        } else if name == "salida" || kind == "salida" {
            Some(Self::Exit)
        } else {
            None
        }
    }
}

/// One authored object, in map pixel coordinates (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRecord {
    pub kind: SpawnKind,
    pub position: Vec2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileLayer {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Row-major gids with flip flags stripped. `0` is an empty cell.
    pub tiles: Vec<u32>,
}

impl TileLayer {
    /// Non-empty cells as `(column, row, gid)`, rows counted from the top of the map.
    pub fn occupied(&self) -> impl Iterator<Item = (u32, u32, u32)> + '_ {
        let width = self.width.max(1);
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, gid)| **gid != 0)
            .map(move |(index, gid)| (index as u32 % width, index as u32 / width, *gid))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilesetInfo {
    pub first_gid: u32,
    pub columns: u32,
    pub rows: u32,
    pub tile_size: UVec2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelDescriptor {
    pub id: LevelId,
    /// Always holds at least two layers: background first, platforms second.
    tile_layers: Vec<TileLayer>,
    pub spawn_records: Vec<SpawnRecord>,
    pub pixel_bounds: Vec2,
    pub tile_size: Vec2,
    pub tileset: Option<TilesetInfo>,
}

impl LevelDescriptor {
    pub fn from_tiled(id: impl Into<LevelId>, map: &TiledMap) -> Result<Self, MapError> {
        let id = id.into();
        let mut tile_layers = Vec::new();
        let mut object_layers = Vec::new();

        for layer in &map.layers {
            match layer {
                TiledLayer::Tiles(raw) => tile_layers.push(read_tile_layer(raw)?),
                TiledLayer::Objects(raw) => object_layers.push(raw),
                TiledLayer::Other => {}
            }
        }

        if tile_layers.len() < 2 {
            return Err(MapError::MissingTileLayers {
                found: tile_layers.len(),
            });
        }

        if object_layers.len() > 1 {
            warn!(
                "Level '{}' has {} object layers; only '{}' is used.",
                id,
                object_layers.len(),
                object_layers[0].name
            );
        }

        let spawn_records: Vec<SpawnRecord> = match object_layers.first() {
            Some(layer) => layer
                .objects
                .iter()
                .filter_map(|object| {
                    SpawnKind::classify(&object.name, &object.kind).map(|kind| SpawnRecord {
                        kind,
                        position: Vec2::new(object.x, object.y),
                    })
                })
                .collect(),
            None => {
                warn!("Level '{}' has no object layer; nothing to spawn.", id);
                Vec::new()
            }
        };

        let tileset = map.tilesets.first().and_then(|raw| {
            let tile_size = UVec2::new(
                if raw.tile_width > 0 { raw.tile_width } else { map.tile_width },
                if raw.tile_height > 0 { raw.tile_height } else { map.tile_height },
            );
            (raw.columns > 0).then(|| {
                let max_gid = tile_layers
                    .iter()
                    .flat_map(|layer| layer.tiles.iter().copied())
                    .max()
                    .unwrap_or(raw.first_gid);
                let used = max_gid.saturating_sub(raw.first_gid) + 1;
                TilesetInfo {
                    first_gid: raw.first_gid,
                    columns: raw.columns,
                    rows: used.div_ceil(raw.columns).max(1),
                    tile_size,
                }
            })
        });

        let (Some(pixel_width), Some(pixel_height)) = (
            map.width.checked_mul(map.tile_width),
            map.height.checked_mul(map.tile_height),
        ) else {
            return Err(MapError::Oversized {
                what: "map",
                width: map.width,
                height: map.height,
            });
        };

        Ok(Self {
            id,
            tile_layers,
            spawn_records,
            pixel_bounds: Vec2::new(pixel_width as f32, pixel_height as f32),
            tile_size: Vec2::new(map.tile_width as f32, map.tile_height as f32),
            tileset,
        })
    }

    pub fn background_layer(&self) -> &TileLayer {
        &self.tile_layers[0]
    }

    pub fn platform_layer(&self) -> &TileLayer {
        &self.tile_layers[1]
    }

    pub fn tile_layers(&self) -> &[TileLayer] {
        &self.tile_layers
    }

    pub fn records(&self, kind: SpawnKind) -> impl Iterator<Item = &SpawnRecord> + '_ {
        self.spawn_records
            .iter()
            .filter(move |record| record.kind == kind)
    }

    /// Converts Tiled pixel coordinates (origin top-left, y down) to world space (origin
    /// bottom-left, y up).
    pub fn to_world(&self, map_px: Vec2) -> Vec2 {
        Vec2::new(map_px.x, self.pixel_bounds.y - map_px.y)
    }

    /// World-space center of the tile at `(column, row)`, rows counted from the top.
    pub fn tile_center(&self, column: u32, row: u32) -> Vec2 {
        self.to_world(Vec2::new(
            (column as f32 + 0.5) * self.tile_size.x,
            (row as f32 + 0.5) * self.tile_size.y,
        ))
    }
}

fn read_tile_layer(raw: &TiledTileLayer) -> Result<TileLayer, MapError> {
    let gids = match &raw.data {
        TiledTileData::Gids(gids) => gids,
        TiledTileData::Encoded(_) => {
            return Err(MapError::UnsupportedEncoding {
                layer: raw.name.clone(),
                encoding: raw.encoding.clone().unwrap_or_else(|| "base64".to_owned()),
            })
        }
    };

    let expected = raw
        .width
        .checked_mul(raw.height)
        .ok_or_else(|| MapError::Oversized {
            what: "tile layer",
            width: raw.width,
            height: raw.height,
        })? as usize;
    if gids.len() != expected {
        return Err(MapError::LayerSize {
            layer: raw.name.clone(),
            expected,
            actual: gids.len(),
        });
    }

    Ok(TileLayer {
        name: raw.name.clone(),
        width: raw.width,
        height: raw.height,
        tiles: gids.iter().map(|gid| gid & GID_FLIP_MASK).collect(),
    })
}

/// Parses raw `.tmj` bytes straight into a descriptor.
pub fn parse_level(id: impl Into<LevelId>, bytes: &[u8]) -> Result<LevelDescriptor, MapError> {
    let map: TiledMap = serde_json::from_slice(bytes)?;
    LevelDescriptor::from_tiled(id, &map)
}

// --- Bevy asset plumbing -------------------------------------------------------------------------

/// The deserialized map as held by the asset server. Turning it into a `LevelDescriptor` is left
/// to the level loader, which knows the level id.
#[derive(Asset, TypePath, Debug)]
pub struct TiledMapAsset {
    pub map: TiledMap,
}

#[derive(Default)]
pub struct TiledMapLoader;

impl AssetLoader for TiledMapLoader {
    type Asset = TiledMapAsset;
    type Settings = ();
    type Error = MapError;

    async fn load<'a>(
        &'a self,
        reader: &'a mut Reader<'_>,
        _settings: &'a (),
        _load_context: &'a mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        let map = serde_json::from_slice(&bytes)?;
        Ok(TiledMapAsset { map })
    }

    fn extensions(&self) -> &[&str] {
        &["tmj"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_json(layers: &str) -> String {
        format!(
            r#"{{
                "width": 3, "height": 2, "tilewidth": 16, "tileheight": 16,
                "tilesets": [{{ "firstgid": 1, "columns": 4, "tilewidth": 16, "tileheight": 16 }}],
                "layers": [{layers}]
            }}"#
        )
    }

    const FIRST: &str =
        r#"{ "type": "tilelayer", "name": "Platforms", "width": 3, "height": 2, "data": [1,1,1,1,1,1] }"#;
    const SECOND: &str =
        r#"{ "type": "tilelayer", "name": "Below", "width": 3, "height": 2, "data": [0,0,0,2,2147483650,0] }"#;

    #[test]
    fn picks_layers_by_position_not_name() {
        let json = map_json(&format!("{FIRST}, {SECOND}"));
        let level = parse_level("level_1", json.as_bytes()).unwrap();

        assert_eq!(level.background_layer().name, "Platforms");
        assert_eq!(level.platform_layer().name, "Below");
        assert_eq!(level.pixel_bounds, Vec2::new(48.0, 32.0));
    }

    #[test]
    fn strips_flip_flags_from_gids() {
        let json = map_json(&format!("{FIRST}, {SECOND}"));
        let level = parse_level("level_1", json.as_bytes()).unwrap();

        assert_eq!(level.platform_layer().tiles, vec![0, 0, 0, 2, 2, 0]);
        let cells: Vec<_> = level.platform_layer().occupied().collect();
        assert_eq!(cells, vec![(0, 1, 2), (1, 1, 2)]);
    }

    #[test]
    fn fewer_than_two_tile_layers_is_fatal() {
        let json = map_json(FIRST);
        let err = parse_level("broken", json.as_bytes()).unwrap_err();
        assert!(matches!(err, MapError::MissingTileLayers { found: 1 }));
    }

    #[test]
    fn base64_layers_are_rejected() {
        let encoded = r#"{ "type": "tilelayer", "name": "Packed", "width": 3, "height": 2,
                           "encoding": "base64", "data": "AQAAAA==" }"#;
        let json = map_json(&format!("{FIRST}, {encoded}"));
        let err = parse_level("packed", json.as_bytes()).unwrap_err();
        assert!(matches!(err, MapError::UnsupportedEncoding { .. }));
    }

    #[test]
    fn short_layer_data_is_rejected() {
        let short = r#"{ "type": "tilelayer", "name": "Short", "width": 3, "height": 2, "data": [1] }"#;
        let json = map_json(&format!("{FIRST}, {short}"));
        let err = parse_level("short", json.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            MapError::LayerSize {
                expected: 6,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn oversized_dimensions_are_errors() {
        let huge = r#"{ "type": "tilelayer", "name": "Huge", "width": 70000, "height": 70000, "data": [] }"#;
        let json = map_json(&format!("{FIRST}, {huge}"));
        assert!(matches!(
            parse_level("huge", json.as_bytes()),
            Err(MapError::Oversized {
                what: "tile layer",
                ..
            })
        ));

        let wide = format!(
            r#"{{
                "width": 3000000, "height": 2, "tilewidth": 4096, "tileheight": 16,
                "layers": [{FIRST}, {SECOND}]
            }}"#
        );
        // Layer sizes are checked against their own width, so only the map bounds overflow here.
        assert!(matches!(
            parse_level("wide", wide.as_bytes()),
            Err(MapError::Oversized { what: "map", .. })
        ));
    }

    #[test]
    fn classifies_object_entries() {
        let objects = r#"{ "type": "objectgroup", "name": "Objects", "objects": [
            { "name": "dude", "type": "", "x": 10, "y": 20 },
            { "name": "", "type": "star", "x": 30, "y": 5 },
            { "name": "", "class": "star", "x": 40, "y": 5 },
            { "name": "salida", "type": "", "x": 44, "y": 16 },
            { "name": "lamp", "type": "decoration", "x": 1, "y": 1 }
        ] }"#;
        let json = map_json(&format!("{FIRST}, {SECOND}, {objects}"));
        let level = parse_level("level_1", json.as_bytes()).unwrap();

        let kinds: Vec<_> = level.spawn_records.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SpawnKind::PlayerSpawn,
                SpawnKind::Collectible,
                SpawnKind::Collectible,
                SpawnKind::Exit
            ]
        );
        assert_eq!(level.spawn_records[0].position, Vec2::new(10.0, 20.0));
        assert_eq!(level.records(SpawnKind::Collectible).count(), 2);
    }

    #[test]
    fn missing_object_layer_yields_no_records() {
        let json = map_json(&format!("{FIRST}, {SECOND}"));
        let level = parse_level("empty", json.as_bytes()).unwrap();
        assert!(level.spawn_records.is_empty());
    }

    #[test]
    fn image_layers_are_skipped() {
        let image = r#"{ "type": "imagelayer", "name": "Sky", "image": "sky.png" }"#;
        let json = map_json(&format!("{image}, {FIRST}, {SECOND}"));
        let level = parse_level("sky", json.as_bytes()).unwrap();
        assert_eq!(level.tile_layers().len(), 2);
        assert_eq!(level.background_layer().name, "Platforms");
    }

    #[test]
    fn converts_map_pixels_to_world_space() {
        let json = map_json(&format!("{FIRST}, {SECOND}"));
        let level = parse_level("level_1", json.as_bytes()).unwrap();

        assert_eq!(level.to_world(Vec2::new(4.0, 0.0)), Vec2::new(4.0, 32.0));
        assert_eq!(level.tile_center(0, 1), Vec2::new(8.0, 8.0));
    }

    #[test]
    fn bundled_levels_parse() {
        let config = crate::level::LevelConfig::default();
        let player_half = config.player_size * 0.5;

        for (id, source) in [
            ("level_1", include_str!("../assets/maps/level_1.tmj")),
            ("level_2", include_str!("../assets/maps/level_2.tmj")),
            ("level_3", include_str!("../assets/maps/level_3.tmj")),
        ] {
            let level = parse_level(id, source.as_bytes()).unwrap();
            assert_eq!(level.records(SpawnKind::PlayerSpawn).count(), 1, "{id}");
            assert_eq!(level.records(SpawnKind::Exit).count(), 1, "{id}");
            assert!(level.records(SpawnKind::Collectible).count() > 0, "{id}");
            assert!(level.tileset.is_some(), "{id}");

            // The player must start clear of platforms or the first sideways step gets pushed back.
            let spawn = level
                .records(SpawnKind::PlayerSpawn)
                .map(|record| level.to_world(record.position))
                .next()
                .unwrap();
            let tile_half = level.tile_size * 0.5;
            for (column, row, _) in level.platform_layer().occupied() {
                let tile = level.tile_center(column, row);
                assert!(
                    !crate::collision::boxes_touch(spawn, player_half, tile, tile_half),
                    "{id}: player spawn {spawn} overlaps tile ({column}, {row})"
                );
            }
        }
    }
}
