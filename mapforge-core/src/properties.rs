use serde::{Deserialize, Serialize};

pub const CLASSNAME_KEY: &str = "classname";
pub const SPAWNFLAGS_KEY: &str = "spawnflags";
pub const ORIGIN_KEY: &str = "origin";
pub const ANGLE_KEY: &str = "angle";
pub const ANGLES_KEY: &str = "angles";
pub const MANGLE_KEY: &str = "mangle";
pub const TARGET_KEY: &str = "target";
pub const KILLTARGET_KEY: &str = "killtarget";
pub const TARGETNAME_KEY: &str = "targetname";
pub const MOD_KEY: &str = "_mod";
pub const DEF_KEY: &str = "_def";
pub const WAD_KEY: &str = "wad";
pub const FACE_POINT_FORMAT_KEY: &str = "_point_format";

pub const WORLDSPAWN_CLASSNAME: &str = "worldspawn";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
}

impl Property {
    #[inline]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// 有序属性表：键唯一，迭代顺序即插入顺序，覆盖已有键时保留原位置。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyStore {
    properties: Vec<Property>,
}

impl PropertyStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|property| property.key == key)
            .map(|property| property.value.as_str())
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 写入属性，返回旧值。
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        match self.properties.iter_mut().find(|property| property.key == key) {
            Some(property) => Some(std::mem::replace(&mut property.value, value)),
            None => {
                self.properties.push(Property::new(key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self
            .properties
            .iter()
            .position(|property| property.key == key)?;
        Some(self.properties.remove(index).value)
    }

    #[inline]
    pub fn clear(&mut self) {
        self.properties.clear();
    }

    #[inline]
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// 所有匹配编号属性族 `base` 的值，按插入顺序。
    pub fn numbered_values<'a>(&'a self, base: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.properties
            .iter()
            .filter(move |property| is_numbered_property(base, &property.key))
            .map(|property| property.value.as_str())
    }
}

/// `base` 本身，或 `base` 后接不带前导零的正整数（`target`、`target2`、`target10`）。
pub fn is_numbered_property(base: &str, key: &str) -> bool {
    let Some(suffix) = key.strip_prefix(base) else {
        return false;
    };
    if suffix.is_empty() {
        return true;
    }
    suffix.bytes().all(|b| b.is_ascii_digit()) && !suffix.starts_with('0')
}

/// 值在设置后不可再修改的键。
pub fn property_is_mutable(key: &str) -> bool {
    !matches!(key, MOD_KEY | DEF_KEY | WAD_KEY | FACE_POINT_FORMAT_KEY)
}

/// 不可删除或改名的键。
pub fn property_key_is_mutable(key: &str) -> bool {
    property_is_mutable(key) && !matches!(key, CLASSNAME_KEY | ORIGIN_KEY | SPAWNFLAGS_KEY)
}
