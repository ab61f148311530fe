use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use roxmltree::{Document, Node};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::geom::{Delta, Orientation, Pos, Rect};
use crate::image_refs::validate_image_ref;

use super::warp::{link_warp_zones, RawWarpZone};
use super::{
    EntityId, Level, LevelError, LevelTile, SourceLocation, Spawnable, Tile, START_CHECKPOINT,
    TILE_SIZE,
};

const IMAGE_VARIANT_PREFIX: &str = "img.";

struct TileDef {
    image: Option<String>,
    properties: BTreeMap<String, String>,
}

struct Ctx<'a, 'input> {
    source_name: &'a str,
    doc: &'a Document<'input>,
}

impl Ctx<'_, '_> {
    fn invalid(&self, node: Node<'_, '_>, message: impl Into<String>) -> LevelError {
        let pos = self.doc.text_pos_at(node.range().start);
        LevelError::Invalid {
            source_name: self.source_name.to_string(),
            message: message.into(),
            location: SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            },
        }
    }

    fn required_attr<'n>(
        &self,
        node: Node<'n, '_>,
        name: &str,
    ) -> Result<&'n str, LevelError> {
        node.attribute(name).ok_or_else(|| {
            self.invalid(
                node,
                format!(
                    "missing attribute '{}' on <{}>",
                    name,
                    node.tag_name().name()
                ),
            )
        })
    }

    fn int_attr<T: std::str::FromStr>(
        &self,
        node: Node<'_, '_>,
        name: &str,
    ) -> Result<T, LevelError> {
        let raw = self.required_attr(node, name)?;
        raw.trim().parse::<T>().map_err(|_| {
            self.invalid(
                node,
                format!("attribute '{}' value '{}' is not a valid integer", name, raw),
            )
        })
    }
}

impl Level {
    pub fn load(path: &Path) -> Result<Level, LevelError> {
        let raw = fs::read_to_string(path).map_err(|source| LevelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let level = Level::parse(&path.display().to_string(), &raw)?;
        info!(
            level = %path.display(),
            width = level.width,
            height = level.height,
            tiles = level.tile_count(),
            spawnables = level.spawnables.len(),
            "level_loaded"
        );
        Ok(level)
    }

    pub fn parse(source_name: &str, raw: &str) -> Result<Level, LevelError> {
        let doc = Document::parse(raw).map_err(|error| LevelError::Xml {
            source_name: source_name.to_string(),
            message: error.to_string(),
            location: SourceLocation {
                line: error.pos().row as usize,
                column: error.pos().col as usize,
            },
        })?;
        let ctx = Ctx {
            source_name,
            doc: &doc,
        };

        let root = doc.root_element();
        if root.tag_name().name() != "level" {
            return Err(ctx.invalid(root, "root element must be <level>"));
        }
        let width: i32 = ctx.int_attr(root, "width")?;
        let height: i32 = ctx.int_attr(root, "height")?;
        if width <= 0 || height <= 0 {
            return Err(ctx.invalid(root, "level width and height must be positive"));
        }
        let save_game_version: u32 = ctx.int_attr(root, "save_game_version")?;

        let mut level = Level {
            width,
            height,
            tiles: vec![None; (width as usize) * (height as usize)],
            spawnables: BTreeMap::new(),
            persistent: BTreeMap::new(),
            player: EntityId::default(),
            checkpoints: BTreeMap::new(),
            warp_initial_states: BTreeMap::new(),
            save_game_version,
            hash: hash_source(raw),
        };

        let mut tile_defs = BTreeMap::<u32, TileDef>::new();
        let mut layer = None;
        let mut objects = None;
        for child in root.children().filter(Node::is_element) {
            match child.tag_name().name() {
                "tileset" => parse_tileset(&ctx, child, &mut tile_defs)?,
                "layer" if layer.is_none() => layer = Some(child),
                "objects" if objects.is_none() => objects = Some(child),
                other => {
                    return Err(ctx.invalid(child, format!("unexpected or duplicate <{}>", other)))
                }
            }
        }

        let Some(layer) = layer else {
            return Err(ctx.invalid(root, "missing <layer>"));
        };
        parse_layer(&ctx, layer, &tile_defs, &mut level)?;

        let mut warp_zones = BTreeMap::<String, Vec<RawWarpZone>>::new();
        let mut player = None;
        if let Some(objects) = objects {
            for object in objects.children().filter(Node::is_element) {
                if object.tag_name().name() != "object" {
                    return Err(ctx.invalid(object, "<objects> may only contain <object>"));
                }
                parse_object(&ctx, object, &mut level, &mut warp_zones, &mut player)?;
            }
        }

        let Some(player) = player else {
            return Err(LevelError::MissingPlayer {
                source_name: source_name.to_string(),
            });
        };
        level.player = player;
        level.checkpoints.insert(START_CHECKPOINT.to_string(), player);

        link_warp_zones(&mut level, warp_zones)?;
        Ok(level)
    }
}

fn parse_properties(
    ctx: &Ctx<'_, '_>,
    node: Node<'_, '_>,
    into: &mut BTreeMap<String, String>,
) -> Result<(), LevelError> {
    for prop in node.children().filter(Node::is_element) {
        if prop.tag_name().name() != "property" {
            return Err(ctx.invalid(
                prop,
                format!(
                    "unexpected <{}> in <{}>",
                    prop.tag_name().name(),
                    node.tag_name().name()
                ),
            ));
        }
        let name = ctx.required_attr(prop, "name")?;
        let value = ctx.required_attr(prop, "value")?;
        into.insert(name.to_string(), value.to_string());
    }
    Ok(())
}

fn parse_tileset(
    ctx: &Ctx<'_, '_>,
    node: Node<'_, '_>,
    tile_defs: &mut BTreeMap<u32, TileDef>,
) -> Result<(), LevelError> {
    for tile in node.children().filter(Node::is_element) {
        if tile.tag_name().name() != "tile" {
            return Err(ctx.invalid(tile, "<tileset> may only contain <tile>"));
        }
        let id: u32 = ctx.int_attr(tile, "id")?;
        if id == 0 {
            return Err(ctx.invalid(tile, "tile id 0 is reserved for empty cells"));
        }
        let image = match tile.attribute("image") {
            Some(image) => {
                validate_image_ref(image).map_err(|error| {
                    ctx.invalid(tile, format!("invalid image '{}': {}", image, error))
                })?;
                Some(image.to_string())
            }
            None => None,
        };
        let mut properties = BTreeMap::new();
        parse_properties(ctx, tile, &mut properties)?;
        if tile_defs.insert(id, TileDef { image, properties }).is_some() {
            return Err(ctx.invalid(tile, format!("duplicate tile id {}", id)));
        }
    }
    Ok(())
}

fn parse_layer(
    ctx: &Ctx<'_, '_>,
    node: Node<'_, '_>,
    tile_defs: &BTreeMap<u32, TileDef>,
    level: &mut Level,
) -> Result<(), LevelError> {
    let text = node.text().unwrap_or_default();
    let rows = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();
    if rows.len() != level.height as usize {
        return Err(ctx.invalid(
            node,
            format!("layer has {} rows, want {}", rows.len(), level.height),
        ));
    }

    for (y, row) in rows.iter().enumerate() {
        let cells = row
            .trim_end_matches(',')
            .split(',')
            .map(str::trim)
            .collect::<Vec<_>>();
        if cells.len() != level.width as usize {
            return Err(ctx.invalid(
                node,
                format!(
                    "layer row {} has {} cells, want {}",
                    y,
                    cells.len(),
                    level.width
                ),
            ));
        }
        for (x, cell) in cells.iter().enumerate() {
            let pos = Pos::new(x as i32, y as i32);
            let (id_text, orientation) = match cell.split_once(':') {
                Some((id_text, orientation_text)) => {
                    let orientation = Orientation::parse(orientation_text).map_err(|error| {
                        ctx.invalid(node, format!("cell {}: {}", pos, error))
                    })?;
                    (id_text, orientation)
                }
                None => (*cell, Orientation::identity()),
            };
            let id = id_text.parse::<u32>().map_err(|_| {
                ctx.invalid(node, format!("cell {} has invalid tile id '{}'", pos, id_text))
            })?;
            if id == 0 {
                continue;
            }
            let Some(def) = tile_defs.get(&id) else {
                return Err(ctx.invalid(node, format!("cell {} uses unknown tile id {}", pos, id)));
            };
            let tile = build_tile(ctx, node, def, pos, orientation)?;
            let index = (pos.y as usize) * (level.width as usize) + pos.x as usize;
            level.tiles[index] = Some(LevelTile {
                tile,
                warp_zones: Vec::new(),
                spawnables: Vec::new(),
            });
        }
    }
    Ok(())
}

fn build_tile(
    ctx: &Ctx<'_, '_>,
    node: Node<'_, '_>,
    def: &TileDef,
    level_pos: Pos,
    orientation: Orientation,
) -> Result<Tile, LevelError> {
    let mut image_by_orientation = BTreeMap::new();
    for (name, value) in &def.properties {
        let Some(orientation_text) = name.strip_prefix(IMAGE_VARIANT_PREFIX) else {
            continue;
        };
        let variant = Orientation::parse(orientation_text)
            .map_err(|error| ctx.invalid(node, format!("tile property '{}': {}", name, error)))?;
        if variant == Orientation::identity() && def.image.as_deref() != Some(value.as_str()) {
            return Err(ctx.invalid(
                node,
                format!("unrotated image variant '{}' differs from the tile image", value),
            ));
        }
        validate_image_ref(value)
            .map_err(|error| ctx.invalid(node, format!("invalid image '{}': {}", value, error)))?;
        image_by_orientation.insert(variant, value.clone());
    }

    Ok(Tile {
        solid: def.properties.get("solid").map(String::as_str) != Some("false"),
        opaque: def.properties.get("opaque").map(String::as_str) != Some("false"),
        level_pos,
        image: def.image.clone(),
        image_by_orientation,
        orientation,
    })
}

fn parse_object(
    ctx: &Ctx<'_, '_>,
    node: Node<'_, '_>,
    level: &mut Level,
    warp_zones: &mut BTreeMap<String, Vec<RawWarpZone>>,
    player: &mut Option<EntityId>,
) -> Result<(), LevelError> {
    let id = EntityId(ctx.int_attr(node, "id")?);
    let mut properties = BTreeMap::new();
    if let Some(entity_type) = node.attribute("type") {
        properties.insert("type".to_string(), entity_type.to_string());
    }
    if let Some(name) = node.attribute("name") {
        properties.insert("name".to_string(), name.to_string());
    }
    parse_properties(ctx, node, &mut properties)?;

    let Some(entity_type) = properties.get("type").cloned() else {
        return Err(ctx.invalid(node, format!("object {} has no type", id)));
    };
    let rect = Rect::new(
        Pos::new(ctx.int_attr(node, "x")?, ctx.int_attr(node, "y")?),
        Delta::new(ctx.int_attr(node, "width")?, ctx.int_attr(node, "height")?),
    );
    if rect.size.dx <= 0 || rect.size.dy <= 0 {
        return Err(ctx.invalid(node, format!("object {} has an empty rectangle", id)));
    }
    let orientation = match properties.get("orientation") {
        Some(text) => Orientation::parse(text)
            .map_err(|error| ctx.invalid(node, format!("object {}: {}", id, error)))?,
        None => Orientation::identity(),
    };
    let (start_tile, end_tile) = rect.tile_span(TILE_SIZE);

    if entity_type == "WarpZone" {
        let name = properties.get("name").cloned().unwrap_or_default();
        warp_zones.entry(name.clone()).or_default().push(RawWarpZone {
            name,
            start_tile,
            end_tile,
            orientation,
            initial_state: properties.get("initial_state").map(String::as_str) != Some("false"),
        });
        return Ok(());
    }

    if level.spawnables.contains_key(&id) {
        return Err(ctx.invalid(node, format!("duplicate object id {}", id)));
    }
    let spawnable = Spawnable {
        id,
        entity_type: entity_type.clone(),
        rect,
        orientation,
        properties,
    };

    match entity_type.as_str() {
        "Player" => {
            if player.replace(id).is_some() {
                return Err(ctx.invalid(node, "more than one Player object"));
            }
            // The player follows the world, not a tile.
            level.spawnables.insert(id, spawnable);
            return Ok(());
        }
        "Checkpoint" => {
            let name = spawnable.property("name").unwrap_or_default().to_string();
            if name.is_empty() {
                return Err(ctx.invalid(node, format!("checkpoint {} has no name", id)));
            }
            if level.checkpoints.insert(name.clone(), id).is_some() {
                return Err(ctx.invalid(node, format!("duplicate checkpoint '{}'", name)));
            }
        }
        _ => {}
    }

    for y in start_tile.y..=end_tile.y {
        for x in start_tile.x..=end_tile.x {
            let pos = Pos::new(x, y);
            let Some(tile) = level.tile_mut(pos) else {
                return Err(LevelError::OutOfBounds {
                    what: format!("{} {}", entity_type, id),
                    pos,
                });
            };
            tile.spawnables.push(id);
        }
    }
    level.spawnables.insert(id, spawnable);
    Ok(())
}

fn hash_source(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    to_hex_lower(&hasher.finalize())
}

pub(crate) fn to_hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::level::test_levels::{warp_room, WARP_ROOM};

    fn minimal(layer: &str, objects: &str) -> String {
        format!(
            r#"<level width="3" height="2" save_game_version="1">
  <tileset><tile id="1"/><tile id="2"><property name="solid" value="false"/></tile></tileset>
  <layer>{layer}</layer>
  <objects>{objects}</objects>
</level>"#
        )
    }

    const PLAYER: &str = r#"<object id="1" type="Player" x="0" y="0" width="8" height="8"/>"#;

    #[test]
    fn parses_tiles_objects_and_defaults() {
        let level = warp_room();

        assert_eq!(level.width(), 16);
        assert_eq!(level.height(), 8);
        assert_eq!(level.save_game_version(), 3);
        assert_eq!(level.player(), EntityId(1));

        let wall = level.tile(Pos::new(0, 0)).expect("wall");
        assert!(wall.tile.solid);
        assert!(wall.tile.opaque);
        assert_eq!(wall.tile.image.as_deref(), Some("wall.png"));

        let floor = level.tile(Pos::new(3, 3)).expect("floor");
        assert!(!floor.tile.solid);
        assert!(!floor.tile.opaque);

        let sprite_tile = level.tile(Pos::new(12, 2)).expect("sprite tile");
        assert_eq!(sprite_tile.spawnables, vec![EntityId(4)]);
        assert_eq!(level.checkpoint("hall").map(|s| s.id), Some(EntityId(5)));
        assert_eq!(level.checkpoint(START_CHECKPOINT).map(|s| s.id), Some(EntityId(1)));
    }

    #[test]
    fn player_is_not_linked_to_tiles() {
        let level = warp_room();
        let mut linked = false;
        level.for_each_tile(|_, tile| linked |= tile.spawnables.contains(&EntityId(1)));
        assert!(!linked);
    }

    #[test]
    fn level_hash_tracks_source_bytes() {
        let a = Level::parse("a", WARP_ROOM).expect("parse");
        let spaced = WARP_ROOM.replace("save_game_version=\"3\"", "save_game_version=\"3\" ");
        let b = Level::parse("b", &spaced).expect("parse");
        assert_eq!(a.hash().len(), 64);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn entity_spanning_tiles_links_every_tile() {
        let raw = minimal(
            "1,2,2\n2,2,1",
            &format!(
                r#"{PLAYER}<object id="9" type="Sprite" x="10" y="10" width="12" height="4"/>"#
            ),
        );
        let level = Level::parse("span", &raw).expect("parse");
        assert_eq!(level.tile(Pos::new(0, 0)).expect("t").spawnables, vec![EntityId(9)]);
        assert_eq!(level.tile(Pos::new(1, 0)).expect("t").spawnables, vec![EntityId(9)]);
        assert!(level.tile(Pos::new(2, 0)).expect("t").spawnables.is_empty());
    }

    #[test]
    fn out_of_bounds_entity_fails() {
        let raw = minimal(
            "1,2,2\n2,2,1",
            &format!(r#"{PLAYER}<object id="9" type="Sprite" x="40" y="20" width="16" height="16"/>"#),
        );
        let err = Level::parse("oob", &raw).expect_err("should fail");
        assert!(matches!(err, LevelError::OutOfBounds { pos, .. } if pos == Pos::new(3, 1)));
    }

    #[test]
    fn empty_cells_stay_absent() {
        let raw = minimal("1,0,2\n2,2,1", PLAYER);
        let level = Level::parse("hole", &raw).expect("parse");
        assert!(level.tile(Pos::new(1, 0)).is_none());
        assert!(level.tile(Pos::new(-1, 0)).is_none());
        assert!(level.tile(Pos::new(3, 0)).is_none());
    }

    #[test]
    fn cell_orientation_suffix_is_parsed() {
        let raw = minimal("1:WS,2,2\n2,2,1:SE", PLAYER);
        let level = Level::parse("flip", &raw).expect("parse");
        assert_eq!(
            level.tile(Pos::new(0, 0)).expect("t").tile.orientation,
            Orientation::flip_x()
        );
        assert_eq!(
            level.tile(Pos::new(2, 1)).expect("t").tile.orientation,
            Orientation::flip_diagonal()
        );
    }

    #[test]
    fn malformed_inputs_report_locations() {
        let err = Level::parse("broken", "<level width=").expect_err("xml");
        assert!(matches!(err, LevelError::Xml { .. }));

        let err = Level::parse("rows", &minimal("1,2,2", PLAYER)).expect_err("rows");
        match err {
            LevelError::Invalid { message, location, .. } => {
                assert!(message.contains("rows"), "{message}");
                assert_eq!(location.line, 3);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = Level::parse("orient", &minimal("1:XX,2,2\n2,2,1", PLAYER)).expect_err("cell");
        assert!(err.to_string().contains("invalid orientation"));

        let err = Level::parse("player", &minimal("1,2,2\n2,2,1", "")).expect_err("player");
        assert!(matches!(err, LevelError::MissingPlayer { .. }));
    }

    #[test]
    fn image_variants_are_indexed_by_orientation() {
        let raw = r#"<level width="1" height="1" save_game_version="1">
  <tileset>
    <tile id="1" image="tiles/wall.png">
      <property name="img.WN" value="tiles/wall_flipped.png"/>
      <property name="img.ES" value="tiles/wall.png"/>
    </tile>
  </tileset>
  <layer>1</layer>
  <objects><object id="1" type="Player" x="0" y="0" width="8" height="8"/></objects>
</level>"#;
        let level = Level::parse("variants", raw).expect("parse");
        let tile = &level.tile(Pos::new(0, 0)).expect("tile").tile;
        assert_eq!(
            tile.image_by_orientation
                .get(&Orientation::turn_around())
                .map(String::as_str),
            Some("tiles/wall_flipped.png")
        );

        let bad = raw.replace(
            r#"name="img.ES" value="tiles/wall.png""#,
            r#"name="img.ES" value="tiles/other.png""#,
        );
        assert!(Level::parse("variants", &bad).is_err());
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("room.xml");
        fs::write(&path, WARP_ROOM).expect("write");

        let level = Level::load(&path).expect("load");
        assert_eq!(level.tile_count(), 16 * 8);

        let missing = Level::load(&dir.path().join("missing.xml")).expect_err("missing");
        assert!(matches!(missing, LevelError::Read { .. }));
    }
}
