use std::io::{Read, Seek};
use std::path::Path;

use tiff::decoder::Decoder;
use tiff::tags::Tag;
use tilecast_tile_utils::{
    webmercator_to_wgs84, wgs84_to_webmercator, EARTH_CIRCUMFERENCE, MAX_LATITUDE, MAX_ZOOM,
    TILE_SIZE,
};
use tilejson::Bounds;

use crate::tiles::geotiff::GeoTiffError;

/// GeoKey ids used by the accepted GeoTIFF layouts.
/// See <https://docs.ogc.org/is/19-008r4/19-008r4.html#_summary_of_geokey_ids_and_names>
const GT_MODEL_TYPE: u16 = 1024;
const GEOGRAPHIC_TYPE: u16 = 2048;
const GEOG_ANGULAR_UNITS: u16 = 2054;
const PROJECTED_CS_TYPE: u16 = 3072;
const PROJ_LINEAR_UNITS: u16 = 3076;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const UNIT_METER: u16 = 9001;
const UNIT_DEGREE: u16 = 9102;

/// Raster-to-model relationship read from the TIFF directory:
/// a pixel scale plus one tie-point, or an affine matrix (rejected later).
#[derive(Clone, Debug, Default)]
pub struct ModelInfo {
    pub pixel_scale: Option<Vec<f64>>,
    pub tie_points: Option<Vec<f64>>,
    pub transformation: Option<Vec<f64>>,
    pub geo_keys: GeoKeys,
}

/// Short-valued GeoKeys relevant to CRS validation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeoKeys {
    pub model_type: Option<u16>,
    pub geographic_crs: Option<u16>,
    pub projected_crs: Option<u16>,
    pub angular_units: Option<u16>,
    pub linear_units: Option<u16>,
}

impl ModelInfo {
    pub fn decode<R: Read + Seek>(decoder: &mut Decoder<R>) -> ModelInfo {
        let pixel_scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok();
        let tie_points = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok();
        let transformation = decoder.get_tag_f64_vec(Tag::ModelTransformationTag).ok();
        let geo_keys = decoder
            .get_tag_u16_vec(Tag::GeoKeyDirectoryTag)
            .map(|dir| parse_geo_keys(&dir))
            .unwrap_or_default();
        ModelInfo {
            pixel_scale,
            tie_points,
            transformation,
            geo_keys,
        }
    }
}

/// Parses the short-valued keys out of a `GeoKeyDirectoryTag` payload.
///
/// The directory is a sequence of 4-u16 entries; the first is the header
/// `(KeyDirectoryVersion, KeyRevision, MinorRevision, NumberOfKeys)`, the
/// rest are `(KeyID, TIFFTagLocation, Count, ValueOffset)` where a location
/// of 0 means the value is stored inline in `ValueOffset`.
#[must_use]
pub fn parse_geo_keys(directory: &[u16]) -> GeoKeys {
    let mut keys = GeoKeys::default();
    let Some(header) = directory.get(..4) else {
        return keys;
    };
    if header[0] != 1 {
        return keys;
    }
    for entry in directory[4..].chunks_exact(4) {
        let (key_id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 {
            continue;
        }
        match key_id {
            GT_MODEL_TYPE => keys.model_type = Some(value),
            GEOGRAPHIC_TYPE => keys.geographic_crs = Some(value),
            GEOG_ANGULAR_UNITS => keys.angular_units = Some(value),
            PROJECTED_CS_TYPE => keys.projected_crs = Some(value),
            PROJ_LINEAR_UNITS => keys.linear_units = Some(value),
            _ => {}
        }
    }
    keys
}

/// Geometry of the raster, computed once at init from the file header.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterProperties {
    /// 3857 or 4326.
    pub srid: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    /// `[min_x, min_y, max_x, max_y]` in EPSG:3857 meters.
    pub projected_bounds: [f64; 4],
    pub geographical_bounds: Bounds,
    /// Pixel size in EPSG:3857 meters, averaged over the raster for
    /// EPSG:4326 files.
    pub pixel_width: f64,
    pub pixel_height: f64,
    /// Web Mercator zoom whose resolution is nearest the native pixel size.
    pub native_zoom: u8,
}

impl RasterProperties {
    pub fn compute(
        model: &ModelInfo,
        (image_width, image_height): (u32, u32),
        (tile_width, tile_height): (u32, u32),
        path: &Path,
    ) -> Result<Self, GeoTiffError> {
        let scale = model.pixel_scale.as_deref().ok_or_else(|| {
            GeoTiffError::invalid_format(path, "ModelPixelScale", "tag is required")
        })?;
        let ties = model.tie_points.as_deref().ok_or_else(|| {
            GeoTiffError::invalid_format(path, "ModelTiePoint", "tag is required")
        })?;
        let (origin_x, origin_y) = (ties[3], ties[4]);
        let (scale_x, scale_y) = (scale[0].abs(), scale[1].abs());
        let (width_f, height_f) = (f64::from(image_width), f64::from(image_height));

        let srid = match model.geo_keys.model_type {
            Some(MODEL_TYPE_PROJECTED) => 3857,
            Some(MODEL_TYPE_GEOGRAPHIC) => 4326,
            other => {
                return Err(GeoTiffError::invalid_format(
                    path,
                    "GTModelTypeGeoKey",
                    format!("expected projected or geographic, got {other:?}"),
                ));
            }
        };

        let (projected_bounds, geographical_bounds) = if srid == 3857 {
            let bounds = [
                origin_x,
                origin_y - height_f * scale_y,
                origin_x + width_f * scale_x,
                origin_y,
            ];
            let (west, south) = webmercator_to_wgs84(bounds[0], bounds[1]);
            let (east, north) = webmercator_to_wgs84(bounds[2], bounds[3]);
            (bounds, Bounds::new(west, south, east, north))
        } else {
            // Degrees are converted to EPSG:3857 meters through the
            // projection of the raster corners.
            let west = origin_x;
            let east = origin_x + width_f * scale_x;
            let north = origin_y.clamp(-MAX_LATITUDE, MAX_LATITUDE);
            let south = (origin_y - height_f * scale_y).clamp(-MAX_LATITUDE, MAX_LATITUDE);
            let (min_x, min_y) = wgs84_to_webmercator(west, south);
            let (max_x, max_y) = wgs84_to_webmercator(east, north);
            (
                [min_x, min_y, max_x, max_y],
                Bounds::new(west, south, east, north),
            )
        };

        let pixel_width = (projected_bounds[2] - projected_bounds[0]) / width_f;
        let pixel_height = (projected_bounds[3] - projected_bounds[1]) / height_f;
        if pixel_width <= 0.0 || pixel_height <= 0.0 {
            return Err(GeoTiffError::invalid_format(
                path,
                "ModelPixelScale",
                "raster has a degenerate extent",
            ));
        }

        Ok(Self {
            srid,
            image_width,
            image_height,
            tile_width,
            tile_height,
            projected_bounds,
            geographical_bounds,
            pixel_width,
            pixel_height,
            native_zoom: native_zoom(pixel_width),
        })
    }

    #[must_use]
    pub fn tiles_across(&self) -> u32 {
        self.image_width.div_ceil(self.tile_width)
    }

    #[must_use]
    pub fn tiles_down(&self) -> u32 {
        self.image_height.div_ceil(self.tile_height)
    }

    #[must_use]
    pub fn intersects(&self, bbox: [f64; 4]) -> bool {
        let b = self.projected_bounds;
        bbox[0] < b[2] && bbox[2] > b[0] && bbox[1] < b[3] && bbox[3] > b[1]
    }
}

/// Web Mercator zoom level whose resolution is closest to `pixel_width`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn native_zoom(pixel_width: f64) -> u8 {
    let zoom = (EARTH_CIRCUMFERENCE / (f64::from(TILE_SIZE) * pixel_width)).log2();
    zoom.round().clamp(0.0, f64::from(MAX_ZOOM)) as u8
}

/// Validates the GeoKeys against the accepted CRS configurations.
pub(crate) fn verify_geo_keys(keys: &GeoKeys, path: &Path) -> Result<(), GeoTiffError> {
    match keys.model_type {
        Some(MODEL_TYPE_PROJECTED) => {
            if keys.projected_crs != Some(3857) {
                return Err(GeoTiffError::invalid_format(
                    path,
                    "ProjectedCSTypeGeoKey",
                    format!("expected 3857, got {:?}", keys.projected_crs),
                ));
            }
            if keys.linear_units.is_some_and(|u| u != UNIT_METER) {
                return Err(GeoTiffError::invalid_format(
                    path,
                    "ProjLinearUnitsGeoKey",
                    format!("expected meter (9001), got {:?}", keys.linear_units),
                ));
            }
        }
        Some(MODEL_TYPE_GEOGRAPHIC) => {
            if keys.geographic_crs != Some(4326) {
                return Err(GeoTiffError::invalid_format(
                    path,
                    "GeographicTypeGeoKey",
                    format!("expected 4326, got {:?}", keys.geographic_crs),
                ));
            }
            if keys.angular_units.is_some_and(|u| u != UNIT_DEGREE) {
                return Err(GeoTiffError::invalid_format(
                    path,
                    "GeogAngularUnitsGeoKey",
                    format!("expected degree (9102), got {:?}", keys.angular_units),
                ));
            }
        }
        other => {
            return Err(GeoTiffError::invalid_format(
                path,
                "GTModelTypeGeoKey",
                format!("expected projected or geographic, got {other:?}"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    use super::*;

    fn directory(entries: &[[u16; 4]]) -> Vec<u16> {
        let mut dir = vec![1, 1, 0, entries.len() as u16];
        for e in entries {
            dir.extend_from_slice(e);
        }
        dir
    }

    #[test]
    fn parses_projected_keys() {
        let dir = directory(&[
            [GT_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED],
            [PROJECTED_CS_TYPE, 0, 1, 3857],
            [PROJ_LINEAR_UNITS, 0, 1, UNIT_METER],
        ]);
        let keys = parse_geo_keys(&dir);
        assert_eq!(keys.model_type, Some(MODEL_TYPE_PROJECTED));
        assert_eq!(keys.projected_crs, Some(3857));
        assert_eq!(keys.linear_units, Some(UNIT_METER));
        verify_geo_keys(&keys, Path::new("t.tif")).unwrap();
    }

    #[test]
    fn skips_keys_stored_in_other_tags() {
        // Location != 0 points into GeoDoubleParams/GeoAsciiParams.
        let dir = directory(&[[GEOGRAPHIC_TYPE, 34736, 1, 0]]);
        assert_eq!(parse_geo_keys(&dir).geographic_crs, None);
    }

    #[test]
    fn bad_header_yields_no_keys() {
        let dir = vec![2, 0, 0, 1, GT_MODEL_TYPE, 0, 1, 1];
        assert_eq!(parse_geo_keys(&dir), GeoKeys::default());
    }

    #[rstest]
    #[case(Some(MODEL_TYPE_PROJECTED), Some(4326), None, "ProjectedCSTypeGeoKey")]
    #[case(Some(MODEL_TYPE_GEOGRAPHIC), None, Some(4269), "GeographicTypeGeoKey")]
    #[case(None, None, None, "GTModelTypeGeoKey")]
    fn rejects_unaccepted_crs(
        #[case] model_type: Option<u16>,
        #[case] projected: Option<u16>,
        #[case] geographic: Option<u16>,
        #[case] expected_key: &str,
    ) {
        let keys = GeoKeys {
            model_type,
            projected_crs: projected,
            geographic_crs: geographic,
            ..GeoKeys::default()
        };
        let err = verify_geo_keys(&keys, Path::new("t.tif")).unwrap_err();
        assert!(matches!(err, GeoTiffError::InvalidFormat { key, .. } if key == expected_key));
    }

    #[rstest]
    #[case(156_543.033_928_041, 0)]
    #[case(611.496_226_281_41, 8)]
    #[case(0.149_291_070_87, 20)]
    fn native_zoom_matches_the_pyramid(#[case] pixel_width: f64, #[case] expected: u8) {
        assert_eq!(native_zoom(pixel_width), expected);
    }

    #[test]
    fn projected_raster_properties() {
        let model = ModelInfo {
            pixel_scale: Some(vec![10.0, 10.0, 0.0]),
            tie_points: Some(vec![0.0, 0.0, 0.0, 1_000_000.0, 5_000_000.0, 0.0]),
            transformation: None,
            geo_keys: GeoKeys {
                model_type: Some(MODEL_TYPE_PROJECTED),
                projected_crs: Some(3857),
                ..GeoKeys::default()
            },
        };
        let props =
            RasterProperties::compute(&model, (512, 256), (256, 256), Path::new("t.tif")).unwrap();
        assert_eq!(props.srid, 3857);
        assert_abs_diff_eq!(props.projected_bounds[0], 1_000_000.0);
        assert_abs_diff_eq!(props.projected_bounds[2], 1_005_120.0);
        assert_abs_diff_eq!(props.projected_bounds[1], 4_997_440.0);
        assert_abs_diff_eq!(props.projected_bounds[3], 5_000_000.0);
        assert_abs_diff_eq!(props.pixel_width, 10.0);
        assert_eq!(props.tiles_across(), 2);
        assert_eq!(props.tiles_down(), 1);
        assert_eq!(props.native_zoom, 14);
    }

    #[test]
    fn geographic_raster_is_projected_to_mercator() {
        let model = ModelInfo {
            pixel_scale: Some(vec![0.001, 0.001, 0.0]),
            tie_points: Some(vec![0.0, 0.0, 0.0, 13.0, 52.6, 0.0]),
            transformation: None,
            geo_keys: GeoKeys {
                model_type: Some(MODEL_TYPE_GEOGRAPHIC),
                geographic_crs: Some(4326),
                ..GeoKeys::default()
            },
        };
        let props =
            RasterProperties::compute(&model, (1000, 1000), (256, 256), Path::new("t.tif"))
                .unwrap();
        assert_eq!(props.srid, 4326);
        let g = props.geographical_bounds;
        assert_abs_diff_eq!(g.left, 13.0);
        assert_abs_diff_eq!(g.right, 14.0);
        assert_abs_diff_eq!(g.top, 52.6);
        assert_abs_diff_eq!(g.bottom, 51.6);
        // One degree of longitude in Mercator meters, split over 1000 px.
        assert_abs_diff_eq!(
            props.pixel_width,
            EARTH_CIRCUMFERENCE / 360.0 / 1000.0,
            epsilon = 1e-6
        );
        // Meridian convergence makes vertical pixels larger than horizontal.
        assert!(props.pixel_height > props.pixel_width);
    }

    #[test]
    fn disjoint_bboxes_do_not_intersect() {
        let model = ModelInfo {
            pixel_scale: Some(vec![10.0, 10.0, 0.0]),
            tie_points: Some(vec![0.0, 0.0, 0.0, 0.0, 1000.0, 0.0]),
            transformation: None,
            geo_keys: GeoKeys {
                model_type: Some(MODEL_TYPE_PROJECTED),
                projected_crs: Some(3857),
                ..GeoKeys::default()
            },
        };
        let props =
            RasterProperties::compute(&model, (100, 100), (256, 256), Path::new("t.tif")).unwrap();
        assert!(props.intersects([500.0, 500.0, 1500.0, 1500.0]));
        assert!(!props.intersects([2000.0, 0.0, 3000.0, 1000.0]));
    }
}
