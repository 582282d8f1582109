use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use ash::vk;
use rayon::prelude::*;

use deimos::pipeline::create_info::RasterizationState;
use deimos::pipeline::render_pass::AttachmentInfo;
use deimos::util::cache::{hash_key, Cache, Resource};
use deimos::{Device, PipelineBuilder, PipelineCreateInfo, RenderPassCreateInfo};

#[derive(Debug)]
struct Derived {
    key: String,
}

impl Resource for Derived {
    type Key = String;
    type ExtraParams<'a> = ();

    fn create(_: Device, key: &String, _: ()) -> Result<Self> {
        Ok(Derived {
            key: key.clone(),
        })
    }
}

/// Stands in for a device object built from a pipeline or render pass description.
#[derive(Debug)]
struct Compiled<K> {
    key: K,
}

impl<K: std::hash::Hash + Eq + Clone> Resource for Compiled<K> {
    type Key = K;
    type ExtraParams<'a> = ();

    fn create(_: Device, key: &K, _: ()) -> Result<Self> {
        Ok(Compiled {
            key: key.clone(),
        })
    }
}

fn compile<K: std::hash::Hash + Eq + Clone>(cache: &Cache<Compiled<K>>, key: &K) -> Result<Arc<Compiled<K>>> {
    cache.get_or_create_with(key, || {
        Ok(Compiled {
            key: key.clone(),
        })
    })
}

fn make(key: &str, created: &AtomicUsize) -> Result<Derived> {
    created.fetch_add(1, Ordering::SeqCst);
    Ok(Derived {
        key: key.to_owned(),
    })
}

#[test]
pub fn equal_keys_share_one_object() -> Result<()> {
    let cache = Cache::<Derived>::new("test");
    let created = AtomicUsize::new(0);
    let key = String::from("opaque-pass");
    let a = cache.get_or_create_with(&key, || make(&key, &created))?;
    let b = cache.get_or_create_with(&key, || make(&key, &created))?;
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(created.load(Ordering::SeqCst), 1);

    let other = String::from("shadow-pass");
    let c = cache.get_or_create_with(&other, || make(&other, &created))?;
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(c.key, "shadow-pass");
    assert_eq!(cache.len(), 2);
    Ok(())
}

#[test]
pub fn failed_creation_inserts_nothing() -> Result<()> {
    let cache = Cache::<Derived>::new("test");
    let key = String::from("broken");
    let result = cache.get_or_create_with(&key, || Err(anyhow!("shader failed to compile")));
    assert!(result.is_err());
    assert!(cache.is_empty());
    assert!(cache.get(&key)?.is_none());
    Ok(())
}

#[test]
pub fn retain_hands_back_evicted_objects() -> Result<()> {
    let cache = Cache::<Derived>::new("test");
    let created = AtomicUsize::new(0);
    for name in ["a", "b", "c"] {
        let key = name.to_owned();
        cache.get_or_create_with(&key, || make(name, &created))?;
    }
    let removed = cache.retain(|key, _| key != "b")?;
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].key, "b");
    assert_eq!(cache.len(), 2);
    assert!(cache.get(&String::from("b"))?.is_none());

    // A cleared object lives on while it is referenced.
    let kept = cache.get(&String::from("a"))?.unwrap();
    let cleared = cache.clear()?;
    assert_eq!(cleared.len(), 2);
    assert!(cache.is_empty());
    assert_eq!(kept.key, "a");
    Ok(())
}

#[test]
pub fn concurrent_requests_resolve_to_the_cached_object() -> Result<()> {
    let cache = Cache::<Derived>::new("test");
    let created = AtomicUsize::new(0);
    let key = String::from("shared");
    let objects = (0..64)
        .into_par_iter()
        .map(|_| cache.get_or_create_with(&key, || make(&key, &created)))
        .collect::<Result<Vec<_>>>()?;
    let cached = cache.get(&key)?.unwrap();
    assert!(objects.iter().all(|object| Arc::ptr_eq(object, &cached)));
    assert_eq!(cache.len(), 1);
    Ok(())
}

#[test]
pub fn pipeline_keys_ignore_the_debug_name() {
    let base = |name: &str| {
        PipelineBuilder::new(name)
            .cull_mask(vk::CullModeFlags::BACK)
            .color_formats(&[vk::Format::R8G8B8A8_SRGB], Some(vk::Format::D32_SFLOAT))
            .build()
    };
    assert_eq!(base("first"), base("second"));
    assert_eq!(hash_key(&base("first")), hash_key(&base("second")));

    let wireframe = PipelineBuilder::new("first")
        .cull_mask(vk::CullModeFlags::BACK)
        .polygon_mode(vk::PolygonMode::LINE)
        .color_formats(&[vk::Format::R8G8B8A8_SRGB], Some(vk::Format::D32_SFLOAT))
        .build();
    assert_ne!(hash_key(&base("first")), hash_key(&wireframe));
}

#[test]
pub fn rasterization_state_compares_floats_bitwise() {
    let a = RasterizationState {
        line_width: 1.0,
        ..Default::default()
    };
    let b = RasterizationState {
        line_width: 2.0,
        ..Default::default()
    };
    assert_ne!(a, b);
    assert_ne!(hash_key(&a), hash_key(&b));
}

#[test]
pub fn pipelines_differing_in_one_field_are_distinct_objects() -> Result<()> {
    let cache = Cache::<Compiled<PipelineCreateInfo>>::new("pipelines");
    let opaque = |name: &str| {
        PipelineBuilder::new(name)
            .cull_mask(vk::CullModeFlags::BACK)
            .color_formats(&[vk::Format::R8G8B8A8_SRGB], Some(vk::Format::D32_SFLOAT))
            .build()
    };
    let base = compile(&cache, &opaque("opaque"))?;
    assert!(Arc::ptr_eq(&base, &compile(&cache, &opaque("renamed"))?));

    let variants = [
        PipelineBuilder::new("opaque")
            .cull_mask(vk::CullModeFlags::FRONT)
            .color_formats(&[vk::Format::R8G8B8A8_SRGB], Some(vk::Format::D32_SFLOAT))
            .build(),
        PipelineBuilder::new("opaque")
            .cull_mask(vk::CullModeFlags::BACK)
            .polygon_mode(vk::PolygonMode::LINE)
            .color_formats(&[vk::Format::R8G8B8A8_SRGB], Some(vk::Format::D32_SFLOAT))
            .build(),
        PipelineBuilder::new("opaque")
            .cull_mask(vk::CullModeFlags::BACK)
            .color_formats(&[vk::Format::B8G8R8A8_SRGB], Some(vk::Format::D32_SFLOAT))
            .build(),
    ];
    for variant in &variants {
        let object = compile(&cache, variant)?;
        assert!(!Arc::ptr_eq(&base, &object));
        assert_eq!(&object.key, variant);
    }
    assert_eq!(cache.len(), 1 + variants.len());
    Ok(())
}

#[test]
pub fn render_passes_differing_in_one_field_are_distinct_objects() -> Result<()> {
    let cache = Cache::<Compiled<RenderPassCreateInfo>>::new("render passes");
    let color = AttachmentInfo::color(vk::Format::R8G8B8A8_UNORM, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    let depth = AttachmentInfo::depth(vk::Format::D32_SFLOAT);
    let base = compile(&cache, &RenderPassCreateInfo::single_pass(&[color], Some(depth)))?;
    assert!(Arc::ptr_eq(
        &base,
        &compile(&cache, &RenderPassCreateInfo::single_pass(&[color], Some(depth)))?
    ));

    let stored = AttachmentInfo {
        store_op: vk::AttachmentStoreOp::STORE,
        ..depth
    };
    let presented = AttachmentInfo {
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..color
    };
    let variants = [
        RenderPassCreateInfo::single_pass(&[color], Some(stored)),
        RenderPassCreateInfo::single_pass(&[presented], Some(depth)),
        RenderPassCreateInfo::single_pass(&[color], None),
    ];
    for variant in &variants {
        assert!(!Arc::ptr_eq(&base, &compile(&cache, variant)?));
    }
    assert_eq!(cache.len(), 4);
    Ok(())
}
