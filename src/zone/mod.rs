// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 告警区域判定 (Zone Containment Engine)
///
/// 两种区域几何:
/// - Rectangle: 开区域, 边界上的点不算在内
/// - Polygon:   射线法(交叉数), 边上的点算在内
///
/// 配置记录在加载时一次性解析为显式枚举:
/// 恰好四个数 → 矩形; 坐标对列表 → 多边形.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::detection::{Point2, StreamId};

// 点到边的叉积容差 (按边长缩放)
const EDGE_EPSILON: f64 = 1e-6;

/// 配置文件中的原始区域记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZoneRecord {
    /// [x1, y1, x2, y2], 角点顺序任意
    Rectangle([f32; 4]),
    /// [[x, y], [x, y], ...], 至少3个顶点
    Polygon(Vec<[f32; 2]>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ZoneRecord", into = "ZoneRecord")]
pub enum Zone {
    /// 已归一化: x1 < x2, y1 < y2
    Rectangle { x1: f32, y1: f32, x2: f32, y2: f32 },
    Polygon(Vec<Point2>),
}

impl Zone {
    /// 任意角点顺序的矩形, 内部归一化
    pub fn rectangle(xa: f32, ya: f32, xb: f32, yb: f32) -> Self {
        Zone::Rectangle {
            x1: xa.min(xb),
            y1: ya.min(yb),
            x2: xa.max(xb),
            y2: ya.max(yb),
        }
    }

    pub fn polygon(vertices: Vec<Point2>) -> Result<Self, String> {
        if vertices.len() < 3 {
            return Err(format!(
                "polygon zone needs at least 3 vertices, got {}",
                vertices.len()
            ));
        }
        Ok(Zone::Polygon(vertices))
    }

    pub fn contains(&self, p: Point2) -> bool {
        match self {
            Zone::Rectangle { x1, y1, x2, y2 } => {
                *x1 < p.x() && p.x() < *x2 && *y1 < p.y() && p.y() < *y2
            }
            Zone::Polygon(vertices) => polygon_contains(vertices, p),
        }
    }
}

impl TryFrom<ZoneRecord> for Zone {
    type Error = String;

    fn try_from(record: ZoneRecord) -> Result<Self, Self::Error> {
        match record {
            ZoneRecord::Rectangle(c) => {
                if c.iter().any(|v| !v.is_finite()) {
                    return Err(format!("rectangle zone has non-finite corner: {:?}", c));
                }
                Ok(Zone::rectangle(c[0], c[1], c[2], c[3]))
            }
            ZoneRecord::Polygon(points) => {
                if points.iter().flatten().any(|v| !v.is_finite()) {
                    return Err("polygon zone has non-finite vertex".to_string());
                }
                Zone::polygon(points.into_iter().map(|[x, y]| Point2::new(x, y)).collect())
            }
        }
    }
}

impl From<Zone> for ZoneRecord {
    fn from(zone: Zone) -> Self {
        match zone {
            Zone::Rectangle { x1, y1, x2, y2 } => ZoneRecord::Rectangle([x1, y1, x2, y2]),
            Zone::Polygon(vertices) => {
                ZoneRecord::Polygon(vertices.iter().map(|p| [p.x(), p.y()]).collect())
            }
        }
    }
}

/// 按顺序检查, 命中第一个区域即返回
pub fn is_inside(center: Point2, zones: &[Zone]) -> bool {
    zones.iter().any(|zone| zone.contains(center))
}

fn polygon_contains(vertices: &[Point2], p: Point2) -> bool {
    let (px, py) = (p.x() as f64, p.y() as f64);
    let mut inside = false;
    let mut j = vertices.len() - 1;

    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i].x() as f64, vertices[i].y() as f64);
        let (xj, yj) = (vertices[j].x() as f64, vertices[j].y() as f64);

        if on_segment((xj, yj), (xi, yi), (px, py)) {
            return true;
        }

        if (yi > py) != (yj > py) {
            let x_cross = xj + (py - yj) * (xi - xj) / (yi - yj);
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }

    inside
}

fn on_segment(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> bool {
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    let length = (b.0 - a.0).hypot(b.1 - a.1).max(1.0);
    if cross.abs() > EDGE_EPSILON * length {
        return false;
    }
    p.0 >= a.0.min(b.0) - EDGE_EPSILON
        && p.0 <= a.0.max(b.0) + EDGE_EPSILON
        && p.1 >= a.1.min(b.1) - EDGE_EPSILON
        && p.1 <= a.1.max(b.1) + EDGE_EPSILON
}

/// 每路视频的告警区域配置 (流ID → 有序区域列表)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneMap(BTreeMap<String, Vec<Zone>>);

impl ZoneMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stream: impl Into<String>, zones: Vec<Zone>) {
        self.0.insert(stream.into(), zones);
    }

    /// 先按完整流ID查找, 再按去扩展名的名字查找 (`CAM.jsonl` 使用 `CAM.mp4` 的配置);
    /// 未配置的流返回空列表, 永不告警
    pub fn zones_for(&self, stream: &StreamId) -> &[Zone] {
        if let Some(zones) = self.0.get(stream.as_str()) {
            return zones;
        }
        let stem = stream.stem();
        self.0
            .iter()
            .find(|(key, _)| StreamId::new(key.as_str()).stem() == stem)
            .map(|(_, zones)| zones.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
