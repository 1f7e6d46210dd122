//! `holder` 集成测试：复制语义经由 `replace` 构造同一具体类型，相等性只在同类型之间成立。

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use ripple_buffer::{
    ByteBuf, ByteBufHolder, DefaultByteBufHolder, Unpooled, checked_content, holder_eq,
};
use ripple_core::{ReferenceCounted, Result, error::codes};

/// 额外携带一个标签字段的持有者。
struct TaggedHolder {
    data: ByteBuf,
    tag: u8,
}

impl ReferenceCounted for TaggedHolder {
    fn ref_cnt(&self) -> i32 {
        self.data.ref_cnt()
    }

    fn retain_n(&self, increment: i32) -> Result<()> {
        self.data.retain_n(increment)
    }

    fn release_n(&self, decrement: i32) -> Result<bool> {
        self.data.release_n(decrement)
    }
}

impl ByteBufHolder for TaggedHolder {
    fn content(&self) -> Result<&ByteBuf> {
        checked_content(&self.data)
    }

    fn replace(&self, content: ByteBuf) -> Self {
        Self {
            data: content,
            tag: self.tag,
        }
    }
}

impl PartialEq for TaggedHolder {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.data == other.data
    }
}

fn hash_of(value: &impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn copy_is_byte_equal_but_storage_independent() {
    let holder = DefaultByteBufHolder::new(Unpooled::copied(b"frame"));
    let copy = holder.copy().expect("深拷贝");
    assert!(holder == copy);
    assert_eq!(hash_of(&holder), hash_of(&copy));

    let mut original = holder.into_content();
    original.set_u8(0, b'F').expect("修改原内容");
    assert_eq!(copy.content().expect("读取拷贝").to_vec().expect("读取"), b"frame");

    assert!(original.release().expect("释放原内容"));
    assert_eq!(copy.ref_cnt(), 1, "拷贝拥有独立计数");
    assert!(copy.release().expect("释放拷贝"));
}

#[test]
fn duplicate_and_retained_duplicate_follow_buffer_semantics() {
    let holder = DefaultByteBufHolder::new(Unpooled::copied(b"abc"));
    let dup = holder.duplicate().expect("复制视图");
    assert_eq!(holder.ref_cnt(), 1);
    assert_eq!(dup.ref_cnt(), 1, "共享同一计数");

    let retained = holder.retained_duplicate().expect("保留型复制视图");
    assert_eq!(holder.ref_cnt(), 2);
    assert!(retained.release().expect("释放保留视图"));
    assert_eq!(holder.ref_cnt(), 1);

    assert!(dup.release().expect("经由复制视图释放"));
    assert_eq!(holder.ref_cnt(), 0);
}

#[test]
fn replace_preserves_variant_fields() {
    let holder = TaggedHolder {
        data: Unpooled::copied(b"xy"),
        tag: 7,
    };
    let copy = holder.copy().expect("深拷贝");
    assert_eq!(copy.tag, 7);
    assert!(holder == copy);
    holder.release().expect("释放");
    copy.release().expect("释放");
}

#[test]
fn equality_holds_only_within_the_same_variant() {
    let plain = DefaultByteBufHolder::new(Unpooled::copied(b"same"));
    let plain_twin = DefaultByteBufHolder::new(Unpooled::copied(b"same"));
    let tagged = TaggedHolder {
        data: Unpooled::copied(b"same"),
        tag: 0,
    };

    assert!(holder_eq(&plain, &plain_twin));
    assert!(
        !holder_eq(&plain, &tagged),
        "内容相同但具体类型不同，比较结果必须为 false"
    );
    assert!(!holder_eq(&tagged, &plain), "反向比较同样为 false");

    for holder in [plain, plain_twin] {
        holder.release().expect("释放");
    }
    tagged.release().expect("释放");
}

#[test]
fn content_of_released_holder_is_rejected() {
    let holder = DefaultByteBufHolder::new(Unpooled::copied(b"gone"));
    assert!(holder.release().expect("释放"));
    let err = holder.content().expect_err("计数归零后不可访问内容");
    assert_eq!(err.code(), codes::BUFFER_ILLEGAL_REFERENCE_COUNT);
    let err = holder.copy().expect_err("计数归零后不可复制");
    assert_eq!(err.code(), codes::BUFFER_ILLEGAL_REFERENCE_COUNT);
    assert!(holder.retain().is_err());
}

#[test]
fn hashing_a_released_holder_does_not_panic() {
    let holder = DefaultByteBufHolder::new(Unpooled::copied(b"hash"));
    holder.release().expect("释放");
    let first = hash_of(&holder);
    assert_eq!(first, hash_of(&holder), "降级哈希保持稳定");
}
