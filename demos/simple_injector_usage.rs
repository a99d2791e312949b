//! bindery 注入器 - 简化使用示例
//!
//! 展示模块声明绑定、常量注入、单例作用域，以及配置错误的汇总报告。

use std::sync::Arc;

use bindery::logging::{init_logging, LoggingConfig};
use bindery::{module_fn, Dependency, Injector, Key, Metadata, Stage};

// 示例服务
struct Config {
    app_name: String,
}

trait Logger: Send + Sync {
    fn log(&self, message: &str);
}

struct ConsoleLogger {
    config: Arc<Config>,
}

impl Logger for ConsoleLogger {
    fn log(&self, message: &str) {
        println!("[{}] {}", self.config.app_name, message);
    }
}

struct DatabaseService {
    url: String,
    logger: Arc<dyn Logger>,
}

impl DatabaseService {
    fn connect(&self) {
        self.logger.log(&format!("Connecting to {}", self.url));
    }
}

bindery::type_tag!(Config, ConsoleLogger, DatabaseService, dyn Logger);

fn metadata() -> Metadata {
    let mut metadata = Metadata::new();
    metadata
        .constructible::<Config>()
        .constructor(
            vec![Dependency::required(Key::named::<String>("app.name"))],
            |arguments| {
                Ok(Config {
                    app_name: arguments.get(0)?,
                })
            },
        )
        .register();
    metadata
        .constructible::<ConsoleLogger>()
        .constructor(vec![Dependency::required(Key::of::<Config>())], |arguments| {
            Ok(ConsoleLogger {
                config: arguments.get(0)?,
            })
        })
        .register();
    metadata
        .constructible::<DatabaseService>()
        .constructor(
            vec![
                Dependency::required(Key::named::<String>("db.url")),
                Dependency::required(Key::of::<dyn Logger>()),
            ],
            |arguments| {
                Ok(DatabaseService {
                    url: arguments.get(0)?,
                    logger: arguments.get(1)?,
                })
            },
        )
        .register();
    metadata.implements::<dyn Logger, ConsoleLogger, _>(
        |logger: Arc<ConsoleLogger>| -> Arc<dyn Logger> { logger },
    );
    metadata
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = init_logging(LoggingConfig::for_stage(Stage::Development));
    println!("🚀 bindery 注入器 - 简化使用示例\n");

    println!("1️⃣ 声明模块");
    let settings = module_fn("settings", |binder| {
        binder.bind_constant().named("app.name").to("MyApp");
        binder.bind_constant().named("db.url").to("postgres://localhost/app");
        Ok(())
    });
    let services = module_fn("services", |binder| {
        binder.bind_type::<Config>().as_singleton();
        binder
            .bind_type::<dyn Logger>()
            .to_type::<ConsoleLogger>()
            .as_singleton();
        Ok(())
    });

    println!("2️⃣ 创建注入器");
    let injector = Injector::create(metadata(), vec![settings, services])?;

    println!("3️⃣ 解析和使用服务");
    let database = injector.instance_of::<Arc<DatabaseService>>()?;
    database.connect();

    println!("\n4️⃣ 验证单例行为");
    let config1 = injector.instance_of::<Arc<Config>>()?;
    let config2 = injector.instance_of::<Arc<Config>>()?;
    println!("配置1和配置2是同一个实例: {}", Arc::ptr_eq(&config1, &config2));

    println!("\n5️⃣ 配置错误会在创建时一次性报告");
    let broken = module_fn("broken", |binder| {
        binder.bind_type::<i32>().to_instance(1).to_instance(2);
        binder.bind_constant().to("unqualified");
        Ok(())
    });
    if let Err(error) = Injector::create(Metadata::new(), vec![broken]) {
        println!("{}", error);
    }

    println!("\n📊 {}", injector.stats().performance_summary());
    Ok(())
}
